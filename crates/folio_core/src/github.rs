use std::env;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::FolioConfig;
use crate::loader::{compute_hash, render_document, write_document_atomic};
use crate::model::{Project, ProjectsDocument, Source};

pub const STATUS_ARCHIVED: &str = "Archivé";
pub const STATUS_ACTIVE: &str = "Actif";
pub const ROLE_AUTHOR: &str = "Auteur";

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Repository as returned by the user repository listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RemoteRepo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

pub trait RepoListingApi {
    /// One page of the account's repositories, most recently updated first.
    fn list_repos_page(&mut self, page: usize, per_page: usize) -> Result<Vec<RemoteRepo>>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct GitHubClientConfig {
    pub api_url: String,
    pub user: String,
    pub token: Option<String>,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub per_page: usize,
    pub max_pages: usize,
}

impl GitHubClientConfig {
    pub fn from_config(config: &FolioConfig, user_override: Option<&str>) -> Result<Self> {
        Self::from_config_with_lookup(config, user_override, |key| env::var(key).ok())
    }

    fn from_config_with_lookup<F>(
        config: &FolioConfig,
        user_override: Option<&str>,
        lookup_env: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let user = user_override
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(ToString::to_string)
            .or_else(|| config.github_user_with(&lookup_env));
        let Some(user) = user else {
            bail!("no GitHub account configured (pass --user, set GH_USER, or set [github].user)");
        };

        Ok(Self {
            api_url: config.github_api_url_with(&lookup_env),
            user,
            token: config.github_token_with(&lookup_env),
            user_agent: config.user_agent_with(&lookup_env),
            timeout_ms: env_value_u64(&lookup_env, "FOLIO_HTTP_TIMEOUT_MS", 30_000),
            max_retries: env_value_u64(&lookup_env, "FOLIO_HTTP_RETRIES", 2) as usize,
            retry_delay_ms: env_value_u64(&lookup_env, "FOLIO_HTTP_RETRY_DELAY_MS", 500),
            per_page: config.per_page(),
            max_pages: config.max_pages(),
        })
    }
}

pub struct GitHubClient {
    client: Client,
    config: GitHubClientConfig,
    request_count: usize,
}

impl GitHubClient {
    pub fn new(config: GitHubClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build GitHub HTTP client")?;
        Ok(Self {
            client,
            config,
            request_count: 0,
        })
    }

    fn repos_url(&self) -> String {
        format!(
            "{}/users/{}/repos",
            self.config.api_url,
            urlencoding::encode(&self.config.user)
        )
    }

    fn request_page(&mut self, params: &[(&str, String)]) -> Result<Vec<RemoteRepo>> {
        let url = self.repos_url();
        for attempt in 0..=self.config.max_retries {
            self.request_count += 1;
            let mut request = self
                .client
                .get(&url)
                .header("Accept", GITHUB_ACCEPT)
                .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
                .header("User-Agent", self.config.user_agent.clone())
                .query(params);
            if let Some(token) = &self.config.token {
                request = request.bearer_auth(token);
            }

            match request.send() {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < self.config.max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt);
                            continue;
                        }
                        let body = response.text().unwrap_or_default();
                        bail!("GitHub API error {}: {}", status.as_u16(), body.trim());
                    }
                    return response
                        .json()
                        .context("failed to decode GitHub repository listing");
                }
                Err(error) => {
                    if attempt < self.config.max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    return Err(error).with_context(|| format!("failed to call {url}"));
                }
            }
        }

        bail!("GitHub API request exhausted retry budget")
    }

    fn wait_before_retry(&self, attempt: usize) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        warn!(attempt, "retrying GitHub request");
        sleep(Duration::from_millis(base.saturating_add(jitter)));
    }
}

impl RepoListingApi for GitHubClient {
    fn list_repos_page(&mut self, page: usize, per_page: usize) -> Result<Vec<RemoteRepo>> {
        self.request_page(&[
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
            ("sort", "updated".to_string()),
        ])
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoListing {
    pub repos: Vec<RemoteRepo>,
    pub pages: usize,
    pub forks_skipped: usize,
}

/// Page through the listing until a short or empty page, or `max_pages`.
/// Forks are left out.
pub fn fetch_repositories<A: RepoListingApi>(
    api: &mut A,
    per_page: usize,
    max_pages: usize,
) -> Result<RepoListing> {
    let mut listing = RepoListing::default();
    for page in 1..=max_pages {
        let items = api
            .list_repos_page(page, per_page)
            .with_context(|| format!("failed to fetch repository page {page}"))?;
        listing.pages = page;
        let count = items.len();
        debug!(page, count, "fetched repository page");

        for repo in items {
            if repo.fork {
                listing.forks_skipped += 1;
            } else {
                listing.repos.push(repo);
            }
        }
        if count < per_page {
            break;
        }
    }
    Ok(listing)
}

pub fn repo_to_project(repo: &RemoteRepo) -> Project {
    let description = repo.description.clone().unwrap_or_default();
    Project {
        slug: repo.name.clone(),
        title: Some(repo.name.replace(['-', '_'], " ")),
        summary: Some(description.clone()),
        description: Some(description),
        status: Some(
            if repo.archived {
                STATUS_ARCHIVED
            } else {
                STATUS_ACTIVE
            }
            .to_string(),
        ),
        tags: Some(Vec::new()),
        tech: Some(Vec::new()),
        period: repo.updated_at.as_deref().and_then(year_of),
        role: Some(ROLE_AUTHOR.to_string()),
        github: Some(repo.html_url.clone()),
        demo: repo
            .homepage
            .as_deref()
            .map(str::trim)
            .filter(|homepage| !homepage.is_empty())
            .map(ToString::to_string),
        media: Some(Vec::new()),
        source: Some(Source::Auto),
        ..Project::default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub user: String,
    pub pages: usize,
    pub forks_skipped: usize,
    pub projects: usize,
    pub request_count: usize,
    pub output_path: PathBuf,
    pub output_hash: String,
}

/// Fetch the configured account's repositories and write the automatic
/// projects document. Nothing is written unless every page succeeded.
pub fn fetch_to_file(config: GitHubClientConfig, output: &Path) -> Result<FetchReport> {
    let user = config.user.clone();
    let (per_page, max_pages) = (config.per_page, config.max_pages);
    let mut client = GitHubClient::new(config)?;
    fetch_to_file_with_api(&mut client, &user, per_page, max_pages, output)
}

fn fetch_to_file_with_api<A: RepoListingApi>(
    api: &mut A,
    user: &str,
    per_page: usize,
    max_pages: usize,
    output: &Path,
) -> Result<FetchReport> {
    info!(user, "fetching repositories");
    let listing = fetch_repositories(api, per_page, max_pages)?;
    let document = ProjectsDocument {
        projects: listing.repos.iter().map(repo_to_project).collect(),
    };
    let rendered = render_document(&document)?;
    write_document_atomic(output, &rendered)?;
    info!(
        path = %output.display(),
        projects = document.projects.len(),
        "wrote automatic projects"
    );

    Ok(FetchReport {
        user: user.to_string(),
        pages: listing.pages,
        forks_skipped: listing.forks_skipped,
        projects: document.projects.len(),
        request_count: api.request_count(),
        output_path: output.to_path_buf(),
        output_hash: compute_hash(&rendered),
    })
}

/// Calendar year of an ISO-8601 timestamp such as `2024-03-01T10:00:00Z`.
fn year_of(timestamp: &str) -> Option<String> {
    let year = timestamp.trim().get(..4)?;
    year.chars()
        .all(|ch| ch.is_ascii_digit())
        .then(|| year.to_string())
}

fn env_value_u64<F>(lookup_env: &F, key: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup_env(key)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}
