use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::{DataSection, FolioConfig};

pub const STATE_DIR_NAME: &str = ".folio";
pub const DATA_DIR_NAME: &str = "data";
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Heuristic,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Heuristic => "heuristic",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub data_dir: PathBuf,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub data_source: ValueSource,
    pub config_source: ValueSource,
}

/// Concrete locations of every data document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub manual: PathBuf,
    pub auto: PathBuf,
    pub merged: PathBuf,
    pub tps: PathBuf,
    pub contributors: PathBuf,
}

impl DataPaths {
    pub fn in_dir(data_dir: &Path, files: &DataSection) -> Self {
        Self {
            manual: data_dir.join(files.manual_file()),
            auto: data_dir.join(files.auto_file()),
            merged: data_dir.join(files.merged_file()),
            tps: data_dir.join(files.tps_file()),
            contributors: data_dir.join(files.contributors_file()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub project_root_exists: bool,
    pub data_dir_exists: bool,
    pub config_exists: bool,
    pub manual_exists: bool,
    pub auto_exists: bool,
    pub merged_exists: bool,
    pub tps_exists: bool,
    pub contributors_exists: bool,
    pub warnings: Vec<String>,
}

impl ResolvedPaths {
    pub fn data_paths(&self, config: &FolioConfig) -> DataPaths {
        DataPaths::in_dir(&self.data_dir, &config.data)
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nstate_dir={}\ndata_dir={} ({})\nconfig_path={} ({})",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.state_dir),
            normalize_for_display(&self.data_dir),
            self.data_source.as_str(),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
        )
    }
}

pub fn inspect_runtime(paths: &ResolvedPaths, data: &DataPaths) -> RuntimeStatus {
    let manual_exists = data.manual.exists();
    let auto_exists = data.auto.exists();
    let merged_exists = data.merged.exists();

    let mut warnings = Vec::new();
    if !manual_exists {
        warnings.push(format!(
            "{} is missing; run `folio init` or author it before merging",
            normalize_for_display(&data.manual)
        ));
    }
    if !auto_exists {
        warnings.push(
            "automatic projects file is missing; run `folio fetch` to list repositories"
                .to_string(),
        );
    }
    if !merged_exists {
        warnings.push(
            "merged projects file is missing; the site falls back to manual projects".to_string(),
        );
    }

    RuntimeStatus {
        project_root_exists: paths.project_root.exists(),
        data_dir_exists: paths.data_dir.exists(),
        config_exists: paths.config_path.exists(),
        manual_exists,
        auto_exists,
        merged_exists,
        tps_exists: data.tps.exists(),
        contributors_exists: data.contributors.exists(),
        warnings,
    }
}

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub created_dirs: Vec<PathBuf>,
    pub wrote_config: bool,
    pub seeded_files: Vec<PathBuf>,
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = resolve_project_root(context, overrides, &lookup_env);
    let state_dir = project_root.join(STATE_DIR_NAME);

    let (data_dir, data_source) = if let Some(path) = overrides.data_dir.as_deref() {
        (
            absolutize(path, &project_root),
            ValueSource::Flag,
        )
    } else if let Some(value) = lookup_env("FOLIO_DATA_DIR") {
        (
            absolutize(Path::new(value.trim()), &project_root),
            ValueSource::Env,
        )
    } else {
        (project_root.join(DATA_DIR_NAME), ValueSource::Default)
    };

    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (
            absolutize(path, &project_root),
            ValueSource::Flag,
        )
    } else if let Some(value) = lookup_env("FOLIO_CONFIG") {
        (
            absolutize(Path::new(value.trim()), &project_root),
            ValueSource::Env,
        )
    } else {
        (state_dir.join(CONFIG_FILENAME), ValueSource::Default)
    };

    Ok(ResolvedPaths {
        project_root,
        state_dir,
        data_dir,
        config_path,
        root_source,
        data_source,
        config_source,
    })
}

/// Create the data directory and config, and seed empty documents that do
/// not exist yet. Existing documents are never overwritten.
pub fn init_layout(
    paths: &ResolvedPaths,
    data: &DataPaths,
    options: &InitOptions,
) -> Result<InitReport> {
    let mut created_dirs = Vec::new();
    for dir in [&paths.state_dir, &paths.data_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            created_dirs.push(dir.clone());
        }
    }

    let wrote_config = write_text_file(
        &paths.config_path,
        &render_materialized_config(paths),
        options.force,
    )?;

    let mut seeded_files = Vec::new();
    let seeds = [
        (&data.manual, "{\n  \"projects\": []\n}\n"),
        (&data.tps, "{\n  \"tps\": []\n}\n"),
        (&data.contributors, "{\n  \"contributors\": []\n}\n"),
    ];
    for (path, content) in seeds {
        if write_text_file(path, content, false)? {
            seeded_files.push(path.clone());
        }
    }

    Ok(InitReport {
        created_dirs,
        wrote_config,
        seeded_files,
    })
}

pub fn render_materialized_config(paths: &ResolvedPaths) -> String {
    let data_dir = normalize_for_display(&paths.data_dir);
    format!(
        "# folio configuration (materialized by `folio init`)\n# Data directory: {data_dir}\n\n[github]\n# user = \"your-account\"\n# api_url = \"https://api.github.com\"\n# user_agent = \"folio/0.2\"\nper_page = 100\nmax_pages = 19\n\n[data]\nmanual = \"projects.json\"\nauto = \"projects.auto.json\"\nmerged = \"projects.final.json\"\ntps = \"tps.json\"\ncontributors = \"contributors.json\"\n",
    )
}

fn resolve_project_root<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: &F,
) -> (PathBuf, ValueSource)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = overrides.project_root.as_deref() {
        return (absolutize(path, &context.cwd), ValueSource::Flag);
    }

    if let Some(value) = lookup_env("FOLIO_PROJECT_ROOT") {
        return (
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        );
    }

    (
        detect_project_root_heuristic(&context.cwd),
        ValueSource::Heuristic,
    )
}

/// Nearest ancestor holding `.folio/` or `data/projects.json`; else the cwd.
fn detect_project_root_heuristic(cwd: &Path) -> PathBuf {
    let mut seen = HashSet::new();
    for candidate in cwd.ancestors() {
        if !seen.insert(normalize_for_display(candidate)) {
            continue;
        }
        if candidate.join(STATE_DIR_NAME).is_dir()
            || candidate
                .join(DATA_DIR_NAME)
                .join(crate::config::DEFAULT_MANUAL_FILE)
                .is_file()
        {
            return candidate.to_path_buf();
        }
    }
    cwd.to_path_buf()
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn write_text_file(path: &Path, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }

    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use tempfile::tempdir;

    use super::{
        InitOptions, PathOverrides, ResolutionContext, ValueSource, init_layout, inspect_runtime,
        resolve_paths_with_lookup,
    };
    use crate::config::{FolioConfig, load_config};

    #[test]
    fn resolve_paths_prefers_flag_over_env() {
        let temp = tempdir().expect("tempdir");
        let cwd = temp.path().join("cwd");
        let from_flag = temp.path().join("flag-root");
        fs::create_dir_all(&cwd).expect("create cwd");

        let overrides = PathOverrides {
            project_root: Some(from_flag.clone()),
            ..PathOverrides::default()
        };
        let context = ResolutionContext { cwd: cwd.clone() };

        let env = HashMap::from([(
            "FOLIO_PROJECT_ROOT".to_string(),
            temp.path().join("env-root").to_string_lossy().to_string(),
        )]);

        let resolved = resolve_paths_with_lookup(&context, &overrides, |key| env.get(key).cloned())
            .expect("resolve paths");
        assert_eq!(resolved.project_root, from_flag);
        assert_eq!(resolved.root_source, ValueSource::Flag);
        assert_eq!(resolved.data_dir, from_flag.join("data"));
        assert_eq!(resolved.data_source, ValueSource::Default);
    }

    #[test]
    fn resolve_paths_reads_data_dir_from_env_relative_to_root() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("site");
        let context = ResolutionContext { cwd: root.clone() };
        let overrides = PathOverrides {
            project_root: Some(root.clone()),
            ..PathOverrides::default()
        };
        let env = HashMap::from([("FOLIO_DATA_DIR".to_string(), "public/data".to_string())]);

        let resolved = resolve_paths_with_lookup(&context, &overrides, |key| env.get(key).cloned())
            .expect("resolve paths");
        assert_eq!(resolved.data_dir, root.join("public").join("data"));
        assert_eq!(resolved.data_source, ValueSource::Env);
    }

    #[test]
    fn heuristic_finds_ancestor_with_data_file() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("site");
        let nested = root.join("assets").join("js");
        fs::create_dir_all(root.join("data")).expect("create data");
        fs::create_dir_all(&nested).expect("create nested");
        fs::write(root.join("data").join("projects.json"), "{}").expect("write");

        let context = ResolutionContext { cwd: nested };
        let resolved = resolve_paths_with_lookup(&context, &PathOverrides::default(), |_| None)
            .expect("resolve paths");
        assert_eq!(resolved.project_root, root);
        assert_eq!(resolved.root_source, ValueSource::Heuristic);
    }

    #[test]
    fn init_layout_creates_config_and_seed_documents() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("project");
        fs::create_dir_all(&root).expect("create root");

        let context = ResolutionContext { cwd: root.clone() };
        let overrides = PathOverrides {
            project_root: Some(root.clone()),
            ..PathOverrides::default()
        };
        let paths = resolve_paths_with_lookup(&context, &overrides, |_| None).expect("resolve");
        let data = paths.data_paths(&FolioConfig::default());

        let report = init_layout(&paths, &data, &InitOptions::default()).expect("init");
        assert_eq!(report.created_dirs.len(), 2);
        assert!(report.wrote_config);
        assert_eq!(report.seeded_files.len(), 3);
        assert!(data.manual.exists());
        assert!(data.tps.exists());
        assert!(data.contributors.exists());

        let config = load_config(&paths.config_path).expect("config parses");
        assert_eq!(config.data.merged_file(), "projects.final.json");

        fs::write(&data.manual, "{\"projects\": [{\"slug\": \"kept\"}]}").expect("write");
        let again = init_layout(&paths, &data, &InitOptions { force: true }).expect("init");
        assert!(again.wrote_config);
        assert!(again.seeded_files.is_empty());
        assert!(
            fs::read_to_string(&data.manual)
                .expect("read")
                .contains("kept")
        );
    }

    #[test]
    fn inspect_runtime_warns_about_missing_documents() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("project");
        fs::create_dir_all(&root).expect("create root");
        let context = ResolutionContext { cwd: root.clone() };
        let overrides = PathOverrides {
            project_root: Some(root),
            ..PathOverrides::default()
        };
        let paths = resolve_paths_with_lookup(&context, &overrides, |_| None).expect("resolve");
        let data = paths.data_paths(&FolioConfig::default());

        let status = inspect_runtime(&paths, &data);
        assert!(!status.manual_exists);
        assert!(!status.merged_exists);
        assert_eq!(status.warnings.len(), 3);
    }
}
