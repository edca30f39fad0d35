//! Integration tests for the registry and installation engines against a
//! sandboxed filesystem layout. Bundle extraction needs the external
//! container tools and real bundles, so these tests fabricate installed
//! state directly and exercise the bookkeeping around it.

use app_manager::installer::Installer;
use app_manager::locations::Locations;
use app_manager::registry::{
    effective_value, HistoryEntry, InstallMode, InstallationRecord, Registry, CLEARED_VALUE,
};
use std::path::{Path, PathBuf};

fn record_at(id: &str, name: &str, locations: &Locations, mode: InstallMode) -> InstallationRecord {
    let installed_path = match mode {
        InstallMode::Portable => locations.apps_dir.join(name),
        InstallMode::Extracted => locations.extracted_dir.join(name),
    };
    InstallationRecord {
        id: id.to_string(),
        name: name.to_string(),
        mode,
        source_checksum: id.to_string(),
        source_path: PathBuf::from("/tmp/source.AppImage"),
        installed_path,
        desktop_file: locations
            .launchers_dir
            .join(format!("appmanager-{}.desktop", name.to_lowercase())),
        icon_path: locations.icons_dir.join(format!("{name}.png")),
        bin_symlink: None,
        installed_at: 1_700_000_000_000,
        updated_at: None,
        version: Some("1.0".to_string()),
        last_modified: None,
        content_length: None,
        last_release_tag: None,
        zsync_update_info: None,
        original_exec_args: Some("%U".to_string()),
        custom_exec_args: None,
        original_keywords: None,
        custom_keywords: None,
        original_wm_class: None,
        custom_wm_class: None,
        original_display_name: Some(name.to_string()),
        custom_display_name: None,
        original_update_url: None,
        custom_update_url: None,
        original_homepage: None,
        custom_homepage: None,
    }
}

fn materialize(record: &InstallationRecord) {
    for parent in [
        record.installed_path.parent(),
        record.desktop_file.parent(),
        record.icon_path.parent(),
    ]
    .into_iter()
    .flatten()
    {
        std::fs::create_dir_all(parent).unwrap();
    }
    match record.mode {
        InstallMode::Portable => std::fs::write(&record.installed_path, b"bundle").unwrap(),
        InstallMode::Extracted => {
            std::fs::create_dir_all(record.installed_path.join("usr/bin")).unwrap();
            std::fs::write(record.installed_path.join("AppRun"), b"#!/bin/sh\n").unwrap();
        }
    }
    std::fs::write(&record.desktop_file, "[Desktop Entry]\nName=App\n").unwrap();
    std::fs::write(&record.icon_path, b"png").unwrap();
}

#[test]
fn registry_persists_records_and_history_in_one_document() {
    let tmp = tempfile::tempdir().unwrap();
    let locations = Locations::rooted_at(tmp.path());
    locations.ensure().unwrap();

    let mut registry = Registry::load(locations.registry_file()).unwrap();
    let mut record = record_at("aaa", "Hello World", &locations, InstallMode::Portable);
    record.custom_keywords = Some("Greeting;Demo;".to_string());
    registry.register(record);
    registry.persist(false).unwrap();

    // A record and, after uninstalling, a history entry share the file.
    registry.unregister("aaa").unwrap();
    registry.persist(false).unwrap();

    let text = std::fs::read_to_string(locations.registry_file()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
    let entries = doc["installations"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].get("id").is_none(), "history entries carry no id");
    assert_eq!(entries[0]["custom_keywords"], "Greeting;Demo;");

    let reloaded = Registry::load(locations.registry_file()).unwrap();
    assert!(reloaded.is_empty());
    assert_eq!(
        reloaded
            .lookup_history("hello world")
            .unwrap()
            .custom_keywords
            .as_deref(),
        Some("Greeting;Demo;")
    );
}

#[test]
fn reconcile_drops_vanished_records_and_keeps_customizations() {
    let tmp = tempfile::tempdir().unwrap();
    let locations = Locations::rooted_at(tmp.path());
    locations.ensure().unwrap();

    let mut registry = Registry::load(locations.registry_file()).unwrap();

    let alive = record_at("alive", "Alive", &locations, InstallMode::Portable);
    materialize(&alive);
    registry.register(alive);

    let mut gone = record_at("gone", "Foo", &locations, InstallMode::Portable);
    gone.custom_update_url = Some("https://example.com".to_string());
    materialize(&gone);
    registry.register(gone.clone());

    // The user deletes the installed file behind our back.
    std::fs::remove_file(&gone.installed_path).unwrap();

    let orphans = registry.reconcile_with_filesystem().unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].id, "gone");
    assert_eq!(registry.len(), 1);
    assert!(!gone.desktop_file.exists());
    assert!(!gone.icon_path.exists());
    assert_eq!(
        registry
            .lookup_history("foo")
            .unwrap()
            .custom_update_url
            .as_deref(),
        Some("https://example.com")
    );

    // The survivor's files are untouched.
    assert!(registry.lookup_by_digest("alive").is_some());
}

#[tokio::test]
async fn uninstall_removes_every_artifact_and_trashes_portable_files() {
    let tmp = tempfile::tempdir().unwrap();
    let locations = Locations::rooted_at(tmp.path());
    locations.ensure().unwrap();

    let mut registry = Registry::load(locations.registry_file()).unwrap();
    let mut record = record_at("abc", "Hello World", &locations, InstallMode::Portable);
    let link = locations.bin_dir.join("hello_world");
    record.bin_symlink = Some(link.clone());
    record.custom_keywords = Some("Greeting;".to_string());
    materialize(&record);
    std::os::unix::fs::symlink(&record.installed_path, &link).unwrap();
    registry.register(record.clone());

    let installer = Installer::new(locations.clone());
    installer.uninstall(&mut registry, "abc").await.unwrap();

    assert!(!record.installed_path.exists());
    assert!(!record.desktop_file.exists());
    assert!(!record.icon_path.exists());
    assert!(!link.exists());
    assert!(registry.lookup_by_digest("abc").is_none());
    // Portable files are trashed, not destroyed.
    assert!(locations.trash_dir.join("files/Hello World").exists());
    // Customizations survive for a later reinstall.
    assert!(registry.lookup_history("Hello World").is_some());
}

#[tokio::test]
async fn uninstall_of_extracted_tree_removes_it_recursively() {
    let tmp = tempfile::tempdir().unwrap();
    let locations = Locations::rooted_at(tmp.path());
    locations.ensure().unwrap();

    let mut registry = Registry::load(locations.registry_file()).unwrap();
    let record = record_at("tree", "editor", &locations, InstallMode::Extracted);
    materialize(&record);
    registry.register(record.clone());

    let installer = Installer::new(locations.clone());
    installer.uninstall(&mut registry, "tree").await.unwrap();

    assert!(!record.installed_path.exists());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn uninstall_of_unknown_target_fails_without_mutation() {
    let tmp = tempfile::tempdir().unwrap();
    let locations = Locations::rooted_at(tmp.path());
    locations.ensure().unwrap();

    let mut registry = Registry::load(locations.registry_file()).unwrap();
    let record = record_at("known", "App", &locations, InstallMode::Portable);
    materialize(&record);
    registry.register(record);

    let installer = Installer::new(locations.clone());
    assert!(installer.uninstall(&mut registry, "mystery").await.is_err());
    assert_eq!(registry.len(), 1);
}

#[test]
fn uninstall_target_resolution_accepts_digest_and_paths() {
    let tmp = tempfile::tempdir().unwrap();
    let locations = Locations::rooted_at(tmp.path());
    locations.ensure().unwrap();

    let mut registry = Registry::load(locations.registry_file()).unwrap();
    let record = record_at("abc", "App", &locations, InstallMode::Portable);
    registry.register(record.clone());
    let installer = Installer::new(locations);

    assert_eq!(installer.resolve_target(&registry, "abc").as_deref(), Some("abc"));
    assert_eq!(
        installer
            .resolve_target(&registry, &record.installed_path.display().to_string())
            .as_deref(),
        Some("abc")
    );
    assert_eq!(
        installer
            .resolve_target(&registry, "/tmp/source.AppImage")
            .as_deref(),
        Some("abc")
    );
    assert!(installer.resolve_target(&registry, "/nowhere").is_none());
}

#[test]
fn history_reapplies_on_reinstall_by_name() {
    let tmp = tempfile::tempdir().unwrap();
    let locations = Locations::rooted_at(tmp.path());
    locations.ensure().unwrap();

    let mut registry = Registry::load(locations.registry_file()).unwrap();
    let mut first = record_at("v1", "Painter", &locations, InstallMode::Portable);
    first.custom_wm_class = Some("painter-main".to_string());
    registry.register(first);
    registry.unregister("v1").unwrap();

    // The installer consults history by name before registering.
    let history: HistoryEntry = registry.lookup_history("painter").unwrap().clone();
    let mut second = record_at("v2", "Painter", &locations, InstallMode::Portable);
    second.apply_history(&history);
    registry.register(second);

    assert!(registry.lookup_history("painter").is_none());
    assert_eq!(
        registry
            .lookup_by_digest("v2")
            .unwrap()
            .effective_wm_class(),
        Some("painter-main")
    );
}

#[test]
fn cleared_sentinel_survives_persistence() {
    let tmp = tempfile::tempdir().unwrap();
    let locations = Locations::rooted_at(tmp.path());
    locations.ensure().unwrap();

    let mut registry = Registry::load(locations.registry_file()).unwrap();
    let mut record = record_at("s", "App", &locations, InstallMode::Portable);
    record.original_keywords = Some("Shipped;".to_string());
    record.custom_keywords = Some(CLEARED_VALUE.to_string());
    registry.register(record);
    registry.persist(false).unwrap();

    let reloaded = Registry::load(locations.registry_file()).unwrap();
    let record = reloaded.lookup_by_digest("s").unwrap();
    // Explicitly un-set stays un-set after a reload.
    assert_eq!(record.effective_keywords(), None);
    assert_eq!(
        effective_value(record.original_keywords.as_deref(), None),
        Some("Shipped;")
    );
}

#[test]
fn legacy_flat_array_documents_still_load() {
    let tmp = tempfile::tempdir().unwrap();
    let locations = Locations::rooted_at(tmp.path());
    locations.ensure().unwrap();

    let record = record_at("old", "Legacy", &locations, InstallMode::Portable);
    std::fs::write(
        locations.registry_file(),
        serde_json::to_string_pretty(&vec![record]).unwrap(),
    )
    .unwrap();

    let registry = Registry::load(locations.registry_file()).unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.lookup_by_digest("old").unwrap().name, "Legacy");
}

#[test]
fn migration_rewrites_uninstall_action_exec() {
    let tmp = tempfile::tempdir().unwrap();
    let locations = Locations::rooted_at(tmp.path());
    locations.ensure().unwrap();

    let mut registry = Registry::load(locations.registry_file()).unwrap();
    let record = record_at("mig", "App", &locations, InstallMode::Portable);
    materialize(&record);
    std::fs::write(
        &record.desktop_file,
        "[Desktop Entry]\nName=App\nExec=\"/apps/App\"\nActions=Uninstall;\n\
         [Desktop Action Uninstall]\nName=Uninstall\nExec=/old/binary --uninstall \"/apps/App\"\n",
    )
    .unwrap();
    registry.register(record.clone());

    Installer::new(locations).migrate_uninstall_actions(&registry);

    let text = std::fs::read_to_string(&record.desktop_file).unwrap();
    assert!(!text.contains("/old/binary"));
    assert!(text.contains("--uninstall"));
    assert!(text.contains(&format!("\"{}\"", record.installed_path.display())));
}

#[test]
fn reconcile_prefix_matching_is_mode_aware() {
    // A portable record whose installed file is a prefix of another path
    // must not be confused with an extracted tree.
    let tmp = tempfile::tempdir().unwrap();
    let locations = Locations::rooted_at(tmp.path());
    locations.ensure().unwrap();

    let mut registry = Registry::load(locations.registry_file()).unwrap();
    let extracted = record_at("x", "suite", &locations, InstallMode::Extracted);
    materialize(&extracted);
    registry.register(extracted.clone());

    // Deleting a file inside the tree does not orphan the record; the
    // tree root still exists.
    std::fs::remove_file(extracted.installed_path.join("AppRun")).unwrap();
    assert!(registry.reconcile_with_filesystem().unwrap().is_empty());

    // Deleting the tree does.
    std::fs::remove_dir_all(&extracted.installed_path).unwrap();
    let orphans = registry.reconcile_with_filesystem().unwrap();
    assert_eq!(orphans.len(), 1);
}

#[test]
fn lock_prevents_concurrent_opens_of_one_bundle() {
    let tmp = tempfile::tempdir().unwrap();
    let locations = Locations::rooted_at(tmp.path());
    let locks = locations.locks_dir();
    let bundle = Path::new("/tmp/locked.AppImage");

    let held = app_manager::lock::BundleLock::acquire(&locks, bundle).unwrap();
    // A different bundle is unaffected.
    let _other =
        app_manager::lock::BundleLock::acquire(&locks, Path::new("/tmp/other.AppImage")).unwrap();
    drop(held);
    let _reacquired = app_manager::lock::BundleLock::acquire(&locks, bundle).unwrap();
}
