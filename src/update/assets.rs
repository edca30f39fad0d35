//! Release descriptions and host-architecture asset selection.

use crate::bundle::{all_arch_aliases, arch_aliases};

/// One downloadable artifact of a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    /// Asset file name
    pub name: String,
    /// Download URL
    pub url: String,
}

/// An upstream release.
#[derive(Debug, Clone)]
pub struct ReleaseInfo {
    /// Raw tag name
    pub tag: String,
    /// Normalized version, when the tag carries one
    pub version: Option<String>,
    /// Downloadable artifacts
    pub assets: Vec<ReleaseAsset>,
}

/// Pick the release asset for this host.
///
/// Only `.appimage` artifacts are considered. In order: an asset naming
/// the host architecture (by any alias); on x86_64 an asset naming no
/// architecture at all; a lone candidate. Anything else is no match.
pub fn select_asset<'a>(assets: &'a [ReleaseAsset], host_arch: &str) -> Option<&'a ReleaseAsset> {
    let bundles: Vec<&ReleaseAsset> = assets
        .iter()
        .filter(|a| {
            a.name.to_lowercase().ends_with(".appimage")
                || a.url.to_lowercase().ends_with(".appimage")
        })
        .collect();

    let aliases = arch_aliases(host_arch);
    if let Some(found) = bundles.iter().find(|a| {
        let haystack = format!("{} {}", a.name, a.url).to_lowercase();
        aliases.iter().any(|alias| haystack.contains(alias))
    }) {
        return Some(found);
    }

    if host_arch == "x86_64" {
        if let Some(found) = bundles.iter().find(|a| {
            let name = a.name.to_lowercase();
            !all_arch_aliases().any(|alias| name.contains(alias))
        }) {
            return Some(found);
        }
    }

    if bundles.len() == 1 {
        return Some(bundles[0]);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str) -> ReleaseAsset {
        ReleaseAsset {
            name: name.to_string(),
            url: format!("https://example.com/dl/{name}"),
        }
    }

    #[test]
    fn host_arch_asset_wins() {
        let assets = vec![asset("Foo-x86_64.AppImage"), asset("Foo-aarch64.AppImage")];
        assert_eq!(
            select_asset(&assets, "x86_64").unwrap().name,
            "Foo-x86_64.AppImage"
        );
        assert_eq!(
            select_asset(&assets, "aarch64").unwrap().name,
            "Foo-aarch64.AppImage"
        );
    }

    #[test]
    fn alias_spellings_are_recognized() {
        let assets = vec![asset("Foo-amd64.AppImage")];
        assert_eq!(
            select_asset(&assets, "x86_64").unwrap().name,
            "Foo-amd64.AppImage"
        );
        let assets = vec![asset("Foo-armhf.AppImage")];
        assert_eq!(
            select_asset(&assets, "armv7l").unwrap().name,
            "Foo-armhf.AppImage"
        );
    }

    #[test]
    fn x86_64_falls_back_to_archless_asset() {
        let assets = vec![asset("App-1.AppImage"), asset("App-2.AppImage")];
        // Two arch-less assets: x86_64 takes the first, others none.
        assert_eq!(select_asset(&assets, "x86_64").unwrap().name, "App-1.AppImage");
        assert!(select_asset(&assets, "aarch64").is_none());
    }

    #[test]
    fn lone_candidate_is_accepted_anywhere() {
        let assets = vec![asset("App-x86_64.AppImage")];
        assert_eq!(
            select_asset(&assets, "aarch64").unwrap().name,
            "App-x86_64.AppImage"
        );
    }

    #[test]
    fn non_bundle_assets_are_invisible() {
        let assets = vec![asset("source.tar.gz"), asset("checksums.txt")];
        assert!(select_asset(&assets, "x86_64").is_none());
    }

    #[test]
    fn selection_by_url_suffix() {
        let odd = ReleaseAsset {
            name: "linux build".to_string(),
            url: "https://example.com/App-x86_64.AppImage".to_string(),
        };
        assert!(select_asset(std::slice::from_ref(&odd), "x86_64").is_some());
    }
}
