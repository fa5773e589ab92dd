use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::loader::load_contributor_entries;
use crate::model::{ContributorEntry, ContributorRef, StructuredContributor};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub handle: String,
    pub url: Option<String>,
}

/// A contributor reference resolved to something displayable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedContributor {
    pub handle: String,
    pub url: Option<String>,
    pub role: Option<String>,
}

/// How a reference is resolved against the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    ById,
    ByHandle,
    Structured,
}

impl ReferenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ById => "by_id",
            Self::ByHandle => "by_handle",
            Self::Structured => "structured",
        }
    }
}

/// Contributor id to public identity. Immutable once built.
///
/// A directory that failed to load is `unavailable`: it resolves nothing, so
/// no contributor is shown at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributorDirectory {
    entries: BTreeMap<String, Identity>,
    available: bool,
}

impl Default for ContributorDirectory {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            available: true,
        }
    }
}

impl ContributorDirectory {
    pub fn unavailable() -> Self {
        Self {
            entries: BTreeMap::new(),
            available: false,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn from_entries(entries: impl IntoIterator<Item = ContributorEntry>) -> Self {
        let mut map = BTreeMap::new();
        for entry in entries {
            let id = entry.id.trim().to_string();
            if id.is_empty() {
                continue;
            }
            if entry.handle.trim().is_empty() {
                warn!(id = %id, "contributor entry without handle; skipping");
                continue;
            }
            if map.contains_key(&id) {
                warn!(id = %id, "duplicate contributor id; keeping the last entry");
            }
            map.insert(
                id,
                Identity {
                    handle: entry.handle,
                    url: non_empty(entry.url.as_deref()),
                },
            );
        }
        Self {
            entries: map,
            available: true,
        }
    }

    /// Load the directory; any read or parse failure yields an unavailable
    /// directory so contributor badges do not render.
    pub fn load(path: &Path) -> Self {
        match load_contributor_entries(path) {
            Ok(entries) => {
                let directory = Self::from_entries(entries);
                debug!(path = %path.display(), count = directory.len(), "loaded contributor directory");
                directory
            }
            Err(error) => {
                warn!(path = %path.display(), error = %format!("{error:#}"), "contributor directory unavailable");
                Self::unavailable()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Identity> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Identity)> {
        self.entries.iter().map(|(id, identity)| (id.as_str(), identity))
    }

    /// A bare string is an id when the directory knows it, a handle otherwise.
    pub fn classify(&self, reference: &ContributorRef) -> ReferenceKind {
        match reference {
            ContributorRef::Name(name) if self.entries.contains_key(name) => ReferenceKind::ById,
            ContributorRef::Name(_) => ReferenceKind::ByHandle,
            ContributorRef::Structured(_) => ReferenceKind::Structured,
        }
    }

    /// Resolve one reference. Explicit `handle`/`url` on a structured
    /// reference override the directory; `id` only supplies defaults.
    pub fn resolve(&self, reference: &ContributorRef) -> Option<ResolvedContributor> {
        if !self.available {
            return None;
        }
        match reference {
            ContributorRef::Name(name) => Some(self.resolve_name(name)),
            ContributorRef::Structured(structured) => self.resolve_structured(structured),
        }
    }

    /// Resolve a list in order, dropping references without a handle.
    pub fn resolve_all(&self, references: &[ContributorRef]) -> Vec<ResolvedContributor> {
        references
            .iter()
            .filter_map(|reference| self.resolve(reference))
            .collect()
    }

    fn resolve_name(&self, name: &str) -> ResolvedContributor {
        match self.entries.get(name) {
            Some(identity) => ResolvedContributor {
                handle: identity.handle.trim().to_string(),
                url: identity.url.clone(),
                role: None,
            },
            None => ResolvedContributor {
                handle: name.to_string(),
                url: None,
                role: None,
            },
        }
    }

    fn resolve_structured(&self, reference: &StructuredContributor) -> Option<ResolvedContributor> {
        let known = reference
            .id
            .as_deref()
            .and_then(|id| self.entries.get(id.trim()));

        let handle = non_empty(reference.handle.as_deref())
            .or_else(|| known.and_then(|identity| non_empty(Some(identity.handle.as_str()))))?;
        let url = non_empty(reference.url.as_deref())
            .or_else(|| known.and_then(|identity| identity.url.clone()));

        Some(ResolvedContributor {
            handle,
            url,
            role: non_empty(reference.role.as_deref()),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{ContributorDirectory, ReferenceKind, ResolvedContributor};
    use crate::model::{ContributorEntry, ContributorRef, StructuredContributor};

    fn directory() -> ContributorDirectory {
        ContributorDirectory::from_entries([ContributorEntry {
            id: "u1".to_string(),
            handle: "Ann".to_string(),
            url: Some("https://x/ann".to_string()),
        }])
    }

    fn structured(
        id: Option<&str>,
        handle: Option<&str>,
        url: Option<&str>,
        role: Option<&str>,
    ) -> ContributorRef {
        ContributorRef::Structured(StructuredContributor {
            id: id.map(ToString::to_string),
            handle: handle.map(ToString::to_string),
            url: url.map(ToString::to_string),
            role: role.map(ToString::to_string),
        })
    }

    #[test]
    fn known_id_resolves_from_directory() {
        let resolved = directory()
            .resolve(&ContributorRef::Name("u1".to_string()))
            .expect("resolved");
        assert_eq!(
            resolved,
            ResolvedContributor {
                handle: "Ann".to_string(),
                url: Some("https://x/ann".to_string()),
                role: None,
            }
        );
    }

    #[test]
    fn explicit_handle_overrides_directory() {
        let resolved = directory()
            .resolve(&structured(Some("u1"), Some("Annie"), None, None))
            .expect("resolved");
        assert_eq!(resolved.handle, "Annie");
        assert_eq!(resolved.url.as_deref(), Some("https://x/ann"));
    }

    #[test]
    fn explicit_url_overrides_directory_and_role_is_attached() {
        let resolved = directory()
            .resolve(&structured(
                Some("u1"),
                None,
                Some("https://y/ann"),
                Some("Rendu"),
            ))
            .expect("resolved");
        assert_eq!(resolved.handle, "Ann");
        assert_eq!(resolved.url.as_deref(), Some("https://y/ann"));
        assert_eq!(resolved.role.as_deref(), Some("Rendu"));
    }

    #[test]
    fn unknown_string_is_used_as_handle() {
        let resolved = directory()
            .resolve(&ContributorRef::Name("unknown-guy".to_string()))
            .expect("resolved");
        assert_eq!(resolved.handle, "unknown-guy");
        assert!(resolved.url.is_none());
    }

    #[test]
    fn structured_reference_without_handle_fails() {
        let directory = directory();
        assert!(directory.resolve(&structured(Some("nobody"), None, None, None)).is_none());
        assert!(directory
            .resolve(&structured(None, Some("  "), Some("https://z"), None))
            .is_none());
    }

    #[test]
    fn resolve_all_keeps_order_and_drops_failures() {
        let resolved = directory().resolve_all(&[
            ContributorRef::Name("bob".to_string()),
            structured(Some("ghost"), None, None, None),
            ContributorRef::Name("u1".to_string()),
        ]);
        let handles: Vec<&str> = resolved.iter().map(|c| c.handle.as_str()).collect();
        assert_eq!(handles, vec!["bob", "Ann"]);
    }

    #[test]
    fn classify_distinguishes_ids_from_handles() {
        let directory = directory();
        assert_eq!(
            directory.classify(&ContributorRef::Name("u1".to_string())),
            ReferenceKind::ById
        );
        assert_eq!(
            directory.classify(&ContributorRef::Name("unknown-guy".to_string())),
            ReferenceKind::ByHandle
        );
        assert_eq!(
            directory.classify(&structured(Some("u1"), None, None, None)),
            ReferenceKind::Structured
        );
    }

    #[test]
    fn load_failure_yields_unavailable_directory_that_resolves_nothing() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("contributors.json");
        let missing = ContributorDirectory::load(&path);
        assert!(missing.is_empty());
        assert!(!missing.is_available());

        fs::write(&path, "{\"contributors\": [").expect("write");
        let broken = ContributorDirectory::load(&path);
        assert!(broken.is_empty());
        assert!(!broken.is_available());
        assert!(
            broken
                .resolve_all(&[
                    ContributorRef::Name("u1".to_string()),
                    structured(Some("u1"), Some("Ann"), None, None),
                ])
                .is_empty()
        );
    }

    #[test]
    fn entries_without_handle_are_skipped() {
        let directory = ContributorDirectory::from_entries([
            ContributorEntry {
                id: "blank".to_string(),
                handle: "  ".to_string(),
                url: Some("https://x/blank".to_string()),
            },
            ContributorEntry {
                id: "u2".to_string(),
                handle: "Bo".to_string(),
                url: None,
            },
        ]);
        assert_eq!(directory.len(), 1);
        assert!(directory.get("blank").is_none());
        let resolved = directory
            .resolve(&ContributorRef::Name("blank".to_string()))
            .expect("resolved");
        assert_eq!(resolved.handle, "blank");
        assert!(resolved.url.is_none());
    }

    #[test]
    fn load_reads_contributors_document() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("contributors.json");
        fs::write(
            &path,
            r#"{"contributors": [{"id": "u1", "handle": "Ann", "url": "https://x/ann"}, {"id": "u2", "handle": "Bo"}]}"#,
        )
        .expect("write");

        let directory = ContributorDirectory::load(&path);
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.get("u2").map(|i| i.handle.as_str()), Some("Bo"));
        assert!(directory.get("u2").and_then(|i| i.url.as_ref()).is_none());
    }
}
