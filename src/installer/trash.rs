//! Freedesktop trash for uninstalled portable bundles.
//!
//! Implements the home-trash subset of the Trash specification: the file
//! moves to `<trash>/files/` and a `.trashinfo` document under
//! `<trash>/info/` records its origin and deletion time.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Move `path` into the trash rooted at `trash_dir`.
///
/// Falls back to plain removal when the trash cannot be used (separate
/// filesystem, exotic setups); an uninstall must not be blocked by trash
/// plumbing.
pub fn move_to_trash(trash_dir: &Path, path: &Path) -> std::io::Result<()> {
    let files_dir = trash_dir.join("files");
    let info_dir = trash_dir.join("info");
    fs::create_dir_all(&files_dir)?;
    fs::create_dir_all(&info_dir)?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("trashed")
        .to_string();
    let (target, info) = unique_trash_paths(&files_dir, &info_dir, &name);

    let mut info_file = fs::File::create(&info)?;
    writeln!(info_file, "[Trash Info]")?;
    writeln!(info_file, "Path={}", path.display())?;
    writeln!(
        info_file,
        "DeletionDate={}",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S")
    )?;

    match fs::rename(path, &target) {
        Ok(()) => Ok(()),
        Err(e) => {
            // Cross-device move; the trash spec does not apply there.
            log::warn!(
                "trash move of {} failed ({e}), removing directly",
                path.display()
            );
            let _ = fs::remove_file(&info);
            fs::remove_file(path)
        }
    }
}

fn unique_trash_paths(files_dir: &Path, info_dir: &Path, name: &str) -> (PathBuf, PathBuf) {
    let mut candidate = name.to_string();
    let mut counter = 2;
    loop {
        let target = files_dir.join(&candidate);
        let info = info_dir.join(format!("{candidate}.trashinfo"));
        if !target.exists() && !info.exists() {
            return (target, info);
        }
        candidate = format!("{name}.{counter}");
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_paths_avoid_collisions() {
        let tmp = tempfile::tempdir().unwrap();
        let files = tmp.path().join("files");
        let info = tmp.path().join("info");
        fs::create_dir_all(&files).unwrap();
        fs::create_dir_all(&info).unwrap();

        let (first, _) = unique_trash_paths(&files, &info, "App");
        assert_eq!(first.file_name().unwrap(), "App");
        fs::write(&first, b"x").unwrap();

        let (second, second_info) = unique_trash_paths(&files, &info, "App");
        assert_eq!(second.file_name().unwrap(), "App.2");
        assert_eq!(second_info.file_name().unwrap(), "App.2.trashinfo");
    }

    #[test]
    fn trashed_file_leaves_an_info_record() {
        let tmp = tempfile::tempdir().unwrap();
        let victim = tmp.path().join("Doomed.AppImage");
        fs::write(&victim, b"x").unwrap();
        let trash = tmp.path().join("Trash");

        move_to_trash(&trash, &victim).unwrap();

        assert!(!victim.exists());
        assert!(trash.join("files/Doomed.AppImage").exists());
        let info =
            fs::read_to_string(trash.join("info/Doomed.AppImage.trashinfo")).unwrap();
        assert!(info.contains("[Trash Info]"));
        assert!(info.contains("Doomed.AppImage"));
    }
}
