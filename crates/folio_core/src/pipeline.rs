use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use similar::TextDiff;
use tracing::{debug, info};

use crate::loader::{
    compute_hash, load_auto_projects, load_manual_projects, render_document,
    write_document_atomic,
};
use crate::merge::{DuplicateSlug, merge_collections};
use crate::model::ProjectsDocument;
use crate::runtime::DataPaths;

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Compare against the existing merged file instead of writing it.
    pub check: bool,
    /// Refuse inputs that repeat a slug.
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeStatus {
    Written,
    Unchanged,
    UpToDate,
    Stale { diff: String },
}

impl MergeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Written => "written",
            Self::Unchanged => "unchanged",
            Self::UpToDate => "up-to-date",
            Self::Stale { .. } => "stale",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MergeReport {
    pub manual_count: usize,
    pub auto_count: usize,
    pub merged_count: usize,
    pub enriched: Vec<String>,
    pub auto_only: Vec<String>,
    pub duplicates: Vec<DuplicateSlug>,
    pub output_path: PathBuf,
    pub output_hash: String,
    pub status: MergeStatus,
}

/// Merge the manual and automatic collections into the merged document.
pub fn run_merge(paths: &DataPaths, options: &MergeOptions) -> Result<MergeReport> {
    let manual = load_manual_projects(&paths.manual).context("failed to load manual projects")?;
    let auto = load_auto_projects(&paths.auto);
    let outcome = merge_collections(&manual, &auto);

    if options.strict && !outcome.duplicates.is_empty() {
        let slugs = outcome
            .duplicates
            .iter()
            .map(|duplicate| format!("{} ({})", duplicate.slug, duplicate.origin.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        bail!("duplicate slugs in input: {slugs}");
    }

    let merged_count = outcome.projects.len();
    let rendered = render_document(&ProjectsDocument {
        projects: outcome.projects,
    })?;
    let existing = read_existing(&paths.merged)?;

    let status = if options.check {
        match existing.as_deref() {
            Some(current) if current == rendered => MergeStatus::UpToDate,
            current => MergeStatus::Stale {
                diff: unified_diff(&paths.merged, current.unwrap_or_default(), &rendered),
            },
        }
    } else if existing.as_deref() == Some(rendered.as_str()) {
        debug!(path = %paths.merged.display(), "merged projects unchanged; not rewriting");
        MergeStatus::Unchanged
    } else {
        write_document_atomic(&paths.merged, &rendered)?;
        MergeStatus::Written
    };

    info!(
        manual = manual.len(),
        auto = auto.len(),
        merged = merged_count,
        enriched = outcome.enriched.len(),
        status = status.as_str(),
        "merge finished"
    );

    Ok(MergeReport {
        manual_count: manual.len(),
        auto_count: auto.len(),
        merged_count,
        enriched: outcome.enriched,
        auto_only: outcome.auto_only,
        duplicates: outcome.duplicates,
        output_path: paths.merged.clone(),
        output_hash: compute_hash(&rendered),
        status,
    })
}

fn read_existing(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn unified_diff(path: &Path, current: &str, generated: &str) -> String {
    let label = path.display().to_string();
    TextDiff::from_lines(current, generated)
        .unified_diff()
        .context_radius(3)
        .header(&label, &format!("{label} (generated)"))
        .to_string()
}
