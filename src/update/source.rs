//! Update-source classification.
//!
//! An update URL from a launcher key or an embedded `.upd_info` hint is
//! classified into a tagged source the engine pattern-matches on:
//! hosted forges (GitHub, GitLab), plain direct URLs, and delta-update
//! manifests (`zsync|...`, `gh-releases-zsync|owner|repo|tag|pattern`).

use url::Url;

/// Hosted forge families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForgeKind {
    /// `github.com` project
    GitHub {
        /// Repository owner
        owner: String,
        /// Repository name
        repo: String,
    },
    /// Any GitLab instance (host contains `gitlab` or path carries `/-/`)
    GitLab {
        /// URL scheme of the instance
        scheme: String,
        /// Instance host
        host: String,
        /// Full project path, un-encoded
        project: String,
    },
}

/// Delta-update flavors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaKind {
    /// `zsync|<absolute manifest URL>`
    Direct {
        /// Manifest URL
        url: String,
    },
    /// `gh-releases-zsync|owner|repo|tag|glob`
    Forge {
        /// Repository owner
        owner: String,
        /// Repository name
        repo: String,
        /// Release tag, `latest` for the newest
        tag: String,
        /// Glob over asset names
        pattern: String,
    },
}

/// A classified update source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateSource {
    /// Forge releases API
    Forge(ForgeKind),
    /// Plain downloadable URL, change-detected by HTTP headers
    Direct(String),
    /// Delta-update manifest
    Delta(DeltaKind),
}

impl UpdateSource {
    /// Classify a raw update string. `None` means unsupported.
    pub fn classify(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Some(payload) = raw.strip_prefix("zsync|") {
            return Some(Self::Delta(DeltaKind::Direct {
                url: payload.to_string(),
            }));
        }
        if let Some(payload) = raw.strip_prefix("gh-releases-zsync|") {
            let mut parts = payload.split('|');
            let owner = parts.next()?.to_string();
            let repo = parts.next()?.to_string();
            let tag = parts.next()?.to_string();
            let pattern = parts.next()?.to_string();
            return Some(Self::Delta(DeltaKind::Forge {
                owner,
                repo,
                tag,
                pattern,
            }));
        }

        let url = Url::parse(raw).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let host = url.host_str()?.to_string();
        let path = url.path();

        if host == "github.com" {
            let mut segments = path.split('/').filter(|s| !s.is_empty());
            let owner = segments.next()?.to_string();
            let repo = segments
                .next()?
                .trim_end_matches(".git")
                .to_string();
            return Some(Self::Forge(ForgeKind::GitHub { owner, repo }));
        }

        if host.contains("gitlab") || path.contains("/-/") {
            let project = gitlab_project_path(path)?;
            return Some(Self::Forge(ForgeKind::GitLab {
                scheme: url.scheme().to_string(),
                host,
                project,
            }));
        }

        Some(Self::Direct(raw.to_string()))
    }

    /// Releases API endpoint for forge sources.
    pub fn api_url(&self) -> Option<String> {
        match self {
            Self::Forge(ForgeKind::GitHub { owner, repo }) => Some(format!(
                "https://api.github.com/repos/{owner}/{repo}/releases?per_page=10"
            )),
            Self::Forge(ForgeKind::GitLab {
                scheme,
                host,
                project,
            }) => Some(format!(
                "{scheme}://{host}/api/v4/projects/{}/releases?per_page=10",
                project.replace('/', "%2F")
            )),
            Self::Delta(DeltaKind::Forge { owner, repo, .. }) => Some(format!(
                "https://api.github.com/repos/{owner}/{repo}/releases?per_page=10"
            )),
            _ => None,
        }
    }
}

/// GitLab project path: everything before the `/-/` marker, or before a
/// trailing `/releases` segment.
fn gitlab_project_path(path: &str) -> Option<String> {
    let trimmed = path.trim_matches('/');
    let project = match trimmed.split_once("/-/") {
        Some((before, _)) => before,
        None => trimmed.strip_suffix("/releases").unwrap_or(trimmed),
    };
    if project.is_empty() {
        None
    } else {
        Some(project.to_string())
    }
}

/// Canonical project base of any supported update URL.
///
/// Idempotent: normalizing a normalized URL is a no-op.
pub fn normalize_update_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Some(payload) = raw.strip_prefix("gh-releases-zsync|") {
        let mut parts = payload.split('|');
        let owner = parts.next()?;
        let repo = parts.next()?;
        return Some(format!("https://github.com/{owner}/{repo}"));
    }
    let raw = raw.strip_prefix("zsync|").unwrap_or(raw);

    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;
    let scheme = url.scheme();

    if host == "github.com" {
        let mut segments = url.path().split('/').filter(|s| !s.is_empty());
        let owner = segments.next()?;
        let repo = segments.next()?.trim_end_matches(".git");
        return Some(format!("https://github.com/{owner}/{repo}"));
    }

    if host.contains("gitlab") || url.path().contains("/-/") {
        let project = gitlab_project_path(url.path())?;
        return Some(format!("{scheme}://{host}/{project}"));
    }

    // Direct URL: the project base is the URL itself minus any delta
    // manifest suffix.
    Some(raw.strip_suffix(".zsync").unwrap_or(raw).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_github_release_urls() {
        let source = UpdateSource::classify(
            "https://github.com/foo/bar/releases/download/v1.0/Foo-x86_64.AppImage",
        )
        .unwrap();
        assert_eq!(
            source,
            UpdateSource::Forge(ForgeKind::GitHub {
                owner: "foo".to_string(),
                repo: "bar".to_string()
            })
        );
        assert_eq!(
            source.api_url().unwrap(),
            "https://api.github.com/repos/foo/bar/releases?per_page=10"
        );
    }

    #[test]
    fn classifies_gitlab_by_host_and_marker() {
        let source = UpdateSource::classify(
            "https://gitlab.com/group/sub/project/-/releases/v1/downloads/App.AppImage",
        )
        .unwrap();
        match &source {
            UpdateSource::Forge(ForgeKind::GitLab { project, .. }) => {
                assert_eq!(project, "group/sub/project");
            }
            other => panic!("unexpected source {other:?}"),
        }
        assert_eq!(
            source.api_url().unwrap(),
            "https://gitlab.com/api/v4/projects/group%2Fsub%2Fproject/releases?per_page=10"
        );

        // Self-hosted instance recognized by the /-/ marker alone.
        let hosted =
            UpdateSource::classify("https://code.example.org/team/app/-/releases").unwrap();
        assert!(matches!(
            hosted,
            UpdateSource::Forge(ForgeKind::GitLab { .. })
        ));
    }

    #[test]
    fn classifies_delta_prefixes() {
        assert_eq!(
            UpdateSource::classify("zsync|https://example.com/App.AppImage.zsync").unwrap(),
            UpdateSource::Delta(DeltaKind::Direct {
                url: "https://example.com/App.AppImage.zsync".to_string()
            })
        );
        assert_eq!(
            UpdateSource::classify("gh-releases-zsync|probo|repo|latest|App-*.AppImage.zsync")
                .unwrap(),
            UpdateSource::Delta(DeltaKind::Forge {
                owner: "probo".to_string(),
                repo: "repo".to_string(),
                tag: "latest".to_string(),
                pattern: "App-*.AppImage.zsync".to_string(),
            })
        );
    }

    #[test]
    fn plain_http_is_direct_and_garbage_is_none() {
        assert!(matches!(
            UpdateSource::classify("https://example.com/downloads/App.AppImage").unwrap(),
            UpdateSource::Direct(_)
        ));
        assert!(UpdateSource::classify("ftp://example.com/x").is_none());
        assert!(UpdateSource::classify("not a url").is_none());
        assert!(UpdateSource::classify("").is_none());
    }

    #[test]
    fn normalization_matches_project_bases() {
        assert_eq!(
            normalize_update_url(
                "https://gitlab.com/group/sub/project/-/releases/v1/downloads/App.AppImage"
            )
            .unwrap(),
            "https://gitlab.com/group/sub/project"
        );
        assert_eq!(
            normalize_update_url(
                "https://github.com/foo/bar/releases/download/v1.0/Foo.AppImage"
            )
            .unwrap(),
            "https://github.com/foo/bar"
        );
        assert_eq!(
            normalize_update_url("gh-releases-zsync|foo|bar|latest|*.zsync").unwrap(),
            "https://github.com/foo/bar"
        );
        assert_eq!(
            normalize_update_url("zsync|https://example.com/App.AppImage.zsync").unwrap(),
            "https://example.com/App.AppImage"
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "https://github.com/foo/bar/releases/download/v1.0/Foo.AppImage",
            "https://gitlab.com/group/sub/project/-/releases",
            "gh-releases-zsync|foo|bar|latest|*.zsync",
            "https://example.com/App.AppImage",
        ] {
            let once = normalize_update_url(raw).unwrap();
            assert_eq!(normalize_update_url(&once).unwrap(), once);
        }
    }
}
