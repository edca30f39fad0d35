//! Freedesktop launcher-entry model.
//!
//! Parses, mutates and serializes `.desktop` files while preserving
//! comments, blank lines, key order and localized `Key[locale]=` variants.
//! Loading is total: a file that cannot be read or parsed produces a
//! warning and an empty model, never an abort.

pub mod exec;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

/// The primary group of a launcher entry.
pub const MAIN_GROUP: &str = "Desktop Entry";

/// Keys recognized by the model (primary group).
pub const RECOGNIZED_KEYS: &[&str] = &[
    "Name",
    "Version",
    "Exec",
    "Icon",
    "Keywords",
    "Categories",
    "StartupWMClass",
    "Terminal",
    "NoDisplay",
    "Actions",
    "X-AppImage-Homepage",
    "X-AppImage-UpdateURL",
    "X-AppImage-Version",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Blank,
    Comment(String),
    KeyValue {
        key: String,
        locale: Option<String>,
        value: String,
    },
}

#[derive(Debug, Clone)]
struct Group {
    name: String,
    lines: Vec<Line>,
}

/// In-memory launcher entry.
#[derive(Debug, Clone, Default)]
pub struct DesktopEntry {
    /// Comments and blanks before the first group header.
    preamble: Vec<Line>,
    groups: Vec<Group>,
}

impl DesktopEntry {
    /// Parse entry text. Total: unrecognizable lines are preserved as
    /// comments so serialization never loses them.
    pub fn parse(text: &str) -> Self {
        let mut entry = DesktopEntry::default();
        let mut current: Option<Group> = None;

        for raw in text.lines() {
            let trimmed = raw.trim();
            let line = if trimmed.is_empty() {
                Line::Blank
            } else if trimmed.starts_with('#') {
                Line::Comment(raw.to_string())
            } else if trimmed.starts_with('[') && trimmed.ends_with(']') {
                let name = trimmed[1..trimmed.len() - 1].to_string();
                if let Some(group) = current.take() {
                    entry.groups.push(group);
                }
                current = Some(Group {
                    name,
                    lines: Vec::new(),
                });
                continue;
            } else if let Some((key_part, value)) = raw.split_once('=') {
                let key_part = key_part.trim();
                let (key, locale) = match key_part.split_once('[') {
                    Some((k, rest)) => (
                        k.to_string(),
                        rest.strip_suffix(']').map(|l| l.to_string()),
                    ),
                    None => (key_part.to_string(), None),
                };
                Line::KeyValue {
                    key,
                    locale,
                    value: value.to_string(),
                }
            } else {
                log::warn!("unparseable desktop entry line kept verbatim: {raw}");
                Line::Comment(raw.to_string())
            };

            match current.as_mut() {
                Some(group) => group.lines.push(line),
                None => entry.preamble.push(line),
            }
        }
        if let Some(group) = current.take() {
            entry.groups.push(group);
        }
        entry
    }

    /// Read and parse a file. IO or encoding problems log a warning and
    /// return an empty model.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) => {
                log::warn!("failed to load desktop entry {}: {e}", path.display());
                DesktopEntry::default()
            }
        }
    }

    /// Serialize back to entry text.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for line in &self.preamble {
            Self::write_line(&mut out, line);
        }
        for group in &self.groups {
            let _ = writeln!(out, "[{}]", group.name);
            for line in &group.lines {
                Self::write_line(&mut out, line);
            }
        }
        out
    }

    fn write_line(out: &mut String, line: &Line) {
        match line {
            Line::Blank => out.push('\n'),
            Line::Comment(text) => {
                out.push_str(text);
                out.push('\n');
            }
            Line::KeyValue { key, locale, value } => {
                match locale {
                    Some(l) => {
                        let _ = writeln!(out, "{key}[{l}]={value}");
                    }
                    None => {
                        let _ = writeln!(out, "{key}={value}");
                    }
                }
            }
        }
    }

    /// Write the entry to a file.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.serialize())
    }

    fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    fn group_mut(&mut self, name: &str) -> &mut Group {
        if let Some(idx) = self.groups.iter().position(|g| g.name == name) {
            return &mut self.groups[idx];
        }
        self.groups.push(Group {
            name: name.to_string(),
            lines: Vec::new(),
        });
        self.groups.last_mut().expect("group just pushed")
    }

    /// Unlocalized value of `key` in the primary group.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_in(MAIN_GROUP, key)
    }

    /// Unlocalized value of `key` in `group`.
    pub fn get_in(&self, group: &str, key: &str) -> Option<&str> {
        self.group(group)?.lines.iter().find_map(|line| match line {
            Line::KeyValue {
                key: k,
                locale: None,
                value,
            } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Set `key` in the primary group. An empty value removes the key.
    pub fn set(&mut self, key: &str, value: &str) {
        self.set_in(MAIN_GROUP, key, value);
    }

    /// Set `key` in `group`. An empty value removes the unlocalized key
    /// instead of writing `key=`.
    pub fn set_in(&mut self, group: &str, key: &str, value: &str) {
        if value.is_empty() {
            self.remove_in(group, key);
            return;
        }
        let group = self.group_mut(group);
        for line in group.lines.iter_mut() {
            if let Line::KeyValue {
                key: k,
                locale: None,
                value: v,
            } = line
            {
                if k == key {
                    *v = value.to_string();
                    return;
                }
            }
        }
        // Insert after the last key of the group to keep trailing blank
        // lines where the file had them.
        let insert_at = group
            .lines
            .iter()
            .rposition(|l| matches!(l, Line::KeyValue { .. }))
            .map(|i| i + 1)
            .unwrap_or(group.lines.len());
        group.lines.insert(
            insert_at,
            Line::KeyValue {
                key: key.to_string(),
                locale: None,
                value: value.to_string(),
            },
        );
    }

    /// Remove the unlocalized `key` from `group`. Localized variants stay.
    pub fn remove_in(&mut self, group: &str, key: &str) {
        if let Some(idx) = self.groups.iter().position(|g| g.name == group) {
            self.groups[idx].lines.retain(|line| {
                !matches!(line, Line::KeyValue { key: k, locale: None, .. } if k == key)
            });
        }
    }

    /// True when the primary group flags the app as terminal-only.
    pub fn is_terminal(&self) -> bool {
        self.get("Terminal")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Effective version: `X-AppImage-Version` wins over `Version`; a
    /// fallback search covers non-canonical group placements.
    pub fn effective_version(&self) -> Option<String> {
        if let Some(v) = self.get("X-AppImage-Version").filter(|v| !v.is_empty()) {
            return Some(v.to_string());
        }
        for group in &self.groups {
            for line in &group.lines {
                if let Line::KeyValue {
                    key,
                    locale: None,
                    value,
                } = line
                {
                    if key == "X-AppImage-Version" && !value.is_empty() {
                        return Some(value.clone());
                    }
                }
            }
        }
        self.get("Version")
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    }

    /// Recognized primary-group keys and their values, for comparisons.
    pub fn to_data(&self) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();
        for key in RECOGNIZED_KEYS {
            if let Some(value) = self.get(key) {
                data.insert((*key).to_string(), value.to_string());
            }
        }
        data
    }

    /// All comment lines, used to assert preservation in tests.
    pub fn comments(&self) -> Vec<&str> {
        self.preamble
            .iter()
            .chain(self.groups.iter().flat_map(|g| g.lines.iter()))
            .filter_map(|l| match l {
                Line::Comment(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Generated by upstream
[Desktop Entry]
Name=Hello World
Name[de]=Hallo Welt
# keep me
Version=1.0
Exec=hello %U
Icon=hello
Terminal=false

[Desktop Action Extra]
Name=Extra
Exec=hello --extra
";

    #[test]
    fn round_trip_preserves_recognized_keys() {
        let entry = DesktopEntry::parse(SAMPLE);
        let reparsed = DesktopEntry::parse(&entry.serialize());
        assert_eq!(entry.to_data(), reparsed.to_data());
    }

    #[test]
    fn round_trip_preserves_comments_and_locales() {
        let entry = DesktopEntry::parse(SAMPLE);
        let text = entry.serialize();
        assert!(text.contains("# Generated by upstream"));
        assert!(text.contains("# keep me"));
        assert!(text.contains("Name[de]=Hallo Welt"));
    }

    #[test]
    fn setting_empty_removes_key() {
        let mut entry = DesktopEntry::parse(SAMPLE);
        entry.set("Icon", "");
        assert!(entry.get("Icon").is_none());
        assert!(!entry.serialize().contains("Icon="));
    }

    #[test]
    fn set_updates_in_place_and_appends_new_keys() {
        let mut entry = DesktopEntry::parse(SAMPLE);
        entry.set("Name", "Renamed");
        entry.set("Keywords", "Greeting;Demo;");
        assert_eq!(entry.get("Name"), Some("Renamed"));
        assert_eq!(entry.get("Keywords"), Some("Greeting;Demo;"));
        // Localized name untouched.
        assert!(entry.serialize().contains("Name[de]=Hallo Welt"));
    }

    #[test]
    fn effective_version_prefers_appimage_key() {
        let mut entry = DesktopEntry::parse(SAMPLE);
        assert_eq!(entry.effective_version().as_deref(), Some("1.0"));
        entry.set("X-AppImage-Version", "2.1");
        assert_eq!(entry.effective_version().as_deref(), Some("2.1"));
    }

    #[test]
    fn effective_version_falls_back_across_groups() {
        let text = "[Desktop Entry]\nName=App\n[Other]\nX-AppImage-Version=3.3\n";
        let entry = DesktopEntry::parse(text);
        assert_eq!(entry.effective_version().as_deref(), Some("3.3"));
    }

    #[test]
    fn parse_of_garbage_is_total() {
        let entry = DesktopEntry::parse("<<<not an ini>>>\n");
        assert!(entry.get("Name").is_none());
        // The garbage line survives serialization.
        assert!(entry.serialize().contains("<<<not an ini>>>"));
    }
}
