use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Manual,
    Auto,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
        }
    }
}

/// One showcased project or TP.
///
/// Every field besides `slug` is optional so that an absent field can be told
/// apart from an explicitly empty one (`"tags": []` is present). Fields outside
/// the known schema land in `extra` and are written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Vec<MediaItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributors: Option<Vec<ContributorRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subprojects: Option<Vec<Project>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Project {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            ..Self::default()
        }
    }

    /// Title for display, falling back to the slug.
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => &self.slug,
        }
    }

    /// Records without an explicit source count as manual.
    pub fn effective_source(&self) -> Source {
        self.source.unwrap_or(Source::Manual)
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned.unwrap_or(false)
    }

    pub fn tags(&self) -> &[String] {
        self.tags.as_deref().unwrap_or_default()
    }

    pub fn tech(&self) -> &[String] {
        self.tech.as_deref().unwrap_or_default()
    }

    pub fn media(&self) -> &[MediaItem] {
        self.media.as_deref().unwrap_or_default()
    }

    pub fn contributors(&self) -> &[ContributorRef] {
        self.contributors.as_deref().unwrap_or_default()
    }

    pub fn subprojects(&self) -> &[Project] {
        self.subprojects.as_deref().unwrap_or_default()
    }

    /// Card image: explicit cover, else the first image in `media`.
    pub fn cover_image(&self) -> Option<&str> {
        if let Some(cover) = self.cover.as_deref()
            && !cover.trim().is_empty()
        {
            return Some(cover);
        }
        self.media()
            .iter()
            .find_map(|item| match item.as_media() {
                Some(Media::Image { .. }) => item.0.get("src").and_then(Value::as_str),
                _ => None,
            })
    }
}

/// Raw media entry. Kept as JSON so unknown types survive a merge untouched;
/// [`MediaItem::as_media`] gives the typed view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaItem(pub Value);

impl MediaItem {
    pub fn as_media(&self) -> Option<Media> {
        serde_json::from_value(self.0.clone()).ok()
    }

    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Media {
    Image {
        src: String,
        #[serde(default)]
        caption: Option<String>,
    },
    Pdf {
        src: String,
        #[serde(default)]
        caption: Option<String>,
    },
    Video {
        #[serde(default)]
        src: Option<String>,
        #[serde(default)]
        sources: Vec<VideoSource>,
        #[serde(default)]
        poster: Option<String>,
        #[serde(default)]
        caption: Option<String>,
    },
    Link {
        href: String,
        #[serde(default)]
        caption: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSource {
    pub src: String,
    #[serde(rename = "type", default)]
    pub mime: Option<String>,
}

/// Inline contributor reference as authored in a record.
///
/// A bare string is either a directory id or, when the directory does not
/// know it, a literal handle; the distinction is made at resolution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContributorRef {
    Name(String),
    Structured(StructuredContributor),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredContributor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectsDocument {
    #[serde(default)]
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TpsDocument {
    #[serde(default)]
    pub tps: Vec<Project>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributorsDocument {
    #[serde(default)]
    pub contributors: Vec<ContributorEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorEntry {
    pub id: String,
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}
