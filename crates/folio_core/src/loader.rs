use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::model::{ContributorEntry, ContributorsDocument, Project, ProjectsDocument, TpsDocument};

/// Read and parse a JSON document.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Like [`read_document`], but a missing file yields `Ok(None)`.
pub fn read_optional_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)
            .map(Some)
            .with_context(|| format!("failed to parse {}", path.display())),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// The manual collection is the source of truth; any failure is fatal.
pub fn load_manual_projects(path: &Path) -> Result<Vec<Project>> {
    let document: ProjectsDocument = read_document(path)?;
    debug!(path = %path.display(), count = document.projects.len(), "loaded manual projects");
    Ok(document.projects)
}

/// A missing or unreadable automatic collection degrades to an empty list.
pub fn load_auto_projects(path: &Path) -> Vec<Project> {
    match read_optional_document::<ProjectsDocument>(path) {
        Ok(Some(document)) => {
            debug!(path = %path.display(), count = document.projects.len(), "loaded automatic projects");
            document.projects
        }
        Ok(None) => {
            debug!(path = %path.display(), "no automatic projects file; continuing without it");
            Vec::new()
        }
        Err(error) => {
            warn!(path = %path.display(), error = %format!("{error:#}"), "ignoring unreadable automatic projects file");
            Vec::new()
        }
    }
}

pub fn load_tps(path: &Path) -> Result<Vec<Project>> {
    let document: TpsDocument = read_document(path)?;
    Ok(document.tps)
}

pub fn load_contributor_entries(path: &Path) -> Result<Vec<ContributorEntry>> {
    let document: ContributorsDocument = read_document(path)?;
    Ok(document.contributors)
}

/// Pretty JSON with two-space indentation and a trailing newline.
pub fn render_document<T: Serialize>(document: &T) -> Result<String> {
    let mut rendered =
        serde_json::to_string_pretty(document).context("failed to serialize JSON document")?;
    rendered.push('\n');
    Ok(rendered)
}

/// Write through a sibling temp file and rename, so readers never observe a
/// half-written document.
pub fn write_document_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    }

    let temp_path = temp_sibling(path);
    fs::write(&temp_path, content)
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    if let Err(error) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(error).with_context(|| format!("failed to replace {}", path.display()));
    }
    Ok(())
}

pub fn compute_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut output = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|value| value.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
