use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "folio/0.2";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_PER_PAGE: usize = 100;
pub const DEFAULT_MAX_PAGES: usize = 19;

pub const DEFAULT_MANUAL_FILE: &str = "projects.json";
pub const DEFAULT_AUTO_FILE: &str = "projects.auto.json";
pub const DEFAULT_MERGED_FILE: &str = "projects.final.json";
pub const DEFAULT_TPS_FILE: &str = "tps.json";
pub const DEFAULT_CONTRIBUTORS_FILE: &str = "contributors.json";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct FolioConfig {
    #[serde(default)]
    pub github: GithubSection,
    #[serde(default)]
    pub data: DataSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct GithubSection {
    pub user: Option<String>,
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
    pub per_page: Option<usize>,
    pub max_pages: Option<usize>,
}

/// File names inside the data directory.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DataSection {
    pub manual: Option<String>,
    pub auto: Option<String>,
    pub merged: Option<String>,
    pub tps: Option<String>,
    pub contributors: Option<String>,
}

impl DataSection {
    pub fn manual_file(&self) -> &str {
        file_or(&self.manual, DEFAULT_MANUAL_FILE)
    }

    pub fn auto_file(&self) -> &str {
        file_or(&self.auto, DEFAULT_AUTO_FILE)
    }

    pub fn merged_file(&self) -> &str {
        file_or(&self.merged, DEFAULT_MERGED_FILE)
    }

    pub fn tps_file(&self) -> &str {
        file_or(&self.tps, DEFAULT_TPS_FILE)
    }

    pub fn contributors_file(&self) -> &str {
        file_or(&self.contributors, DEFAULT_CONTRIBUTORS_FILE)
    }
}

impl FolioConfig {
    /// Resolve the GitHub account: env GH_USER > config > None.
    pub fn github_user(&self) -> Option<String> {
        self.github_user_with(|key| env::var(key).ok())
    }

    pub fn github_user_with<F>(&self, lookup_env: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        non_empty(lookup_env("GH_USER")).or_else(|| non_empty(self.github.user.clone()))
    }

    /// Tokens only ever come from the environment: GITHUB_TOKEN > GH_TOKEN.
    pub fn github_token_with<F>(&self, lookup_env: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        non_empty(lookup_env("GITHUB_TOKEN")).or_else(|| non_empty(lookup_env("GH_TOKEN")))
    }

    /// Resolve API base URL: env FOLIO_GITHUB_API_URL > config > default.
    pub fn github_api_url_with<F>(&self, lookup_env: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        non_empty(lookup_env("FOLIO_GITHUB_API_URL"))
            .or_else(|| non_empty(self.github.api_url.clone()))
            .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Resolve user agent: env FOLIO_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent_with<F>(&self, lookup_env: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        non_empty(lookup_env("FOLIO_USER_AGENT"))
            .or_else(|| non_empty(self.github.user_agent.clone()))
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Page size, clamped to what the listing endpoint accepts.
    pub fn per_page(&self) -> usize {
        self.github
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, DEFAULT_PER_PAGE)
    }

    pub fn max_pages(&self) -> usize {
        self.github.max_pages.unwrap_or(DEFAULT_MAX_PAGES).max(1)
    }
}

/// Load and parse a FolioConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<FolioConfig> {
    if !config_path.exists() {
        return Ok(FolioConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: FolioConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn file_or<'a>(value: &'a Option<String>, default: &'a str) -> &'a str {
    match value.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => default,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_uses_default_file_names() {
        let config = FolioConfig::default();
        assert_eq!(config.data.manual_file(), "projects.json");
        assert_eq!(config.data.auto_file(), "projects.auto.json");
        assert_eq!(config.data.merged_file(), "projects.final.json");
        assert_eq!(config.data.tps_file(), "tps.json");
        assert_eq!(config.data.contributors_file(), "contributors.json");
        assert_eq!(config.per_page(), 100);
        assert_eq!(config.max_pages(), 19);
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert!(config.github.user.is_none());
    }

    #[test]
    fn load_config_parses_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[github]
user = "octo"
api_url = "https://ghe.example/api/v3/"
per_page = 500
max_pages = 3

[data]
merged = "all.json"
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.github_user_with(|_| None).as_deref(), Some("octo"));
        assert_eq!(
            config.github_api_url_with(|_| None),
            "https://ghe.example/api/v3"
        );
        assert_eq!(config.per_page(), 100);
        assert_eq!(config.max_pages(), 3);
        assert_eq!(config.data.merged_file(), "all.json");
        assert_eq!(config.data.manual_file(), "projects.json");
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[github\nuser = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn env_overrides_config() {
        let config = FolioConfig {
            github: GithubSection {
                user: Some("from-config".to_string()),
                user_agent: Some("config-agent".to_string()),
                ..GithubSection::default()
            },
            ..FolioConfig::default()
        };
        let env = HashMap::from([
            ("GH_USER".to_string(), " from-env ".to_string()),
            ("GH_TOKEN".to_string(), "gh-token".to_string()),
            ("FOLIO_USER_AGENT".to_string(), "   ".to_string()),
        ]);
        let lookup = |key: &str| env.get(key).cloned();

        assert_eq!(config.github_user_with(lookup).as_deref(), Some("from-env"));
        assert_eq!(config.github_token_with(lookup).as_deref(), Some("gh-token"));
        assert_eq!(config.user_agent_with(lookup), "config-agent");
        assert_eq!(config.github_api_url_with(lookup), DEFAULT_GITHUB_API_URL);
    }

    #[test]
    fn github_token_prefers_github_token_variable() {
        let config = FolioConfig::default();
        let env = HashMap::from([
            ("GITHUB_TOKEN".to_string(), "primary".to_string()),
            ("GH_TOKEN".to_string(), "secondary".to_string()),
        ]);
        assert_eq!(
            config
                .github_token_with(|key| env.get(key).cloned())
                .as_deref(),
            Some("primary")
        );
        assert!(config.github_token_with(|_| None).is_none());
    }
}
