use std::thread;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

use crate::contributors::ContributorDirectory;
use crate::loader::{load_manual_projects, load_tps, read_optional_document};
use crate::model::{Project, ProjectsDocument};
use crate::route::{Route, View, build_view};
use crate::runtime::DataPaths;

/// Which document the project collection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectsOrigin {
    Merged,
    Manual,
}

impl ProjectsOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Merged => "merged",
            Self::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadedFlags {
    pub projects: bool,
    pub tps: bool,
    pub contributors: bool,
}

/// Per-session caches for the collections the views read.
///
/// Each collection is loaded at most once successfully. A failed project or
/// TP load is not cached, so the next call tries again; a failed contributor
/// load is cached as an unavailable directory for the rest of the session.
#[derive(Debug)]
pub struct Session {
    paths: DataPaths,
    projects: Option<Vec<Project>>,
    projects_origin: Option<ProjectsOrigin>,
    tps: Option<Vec<Project>>,
    contributors: Option<ContributorDirectory>,
}

impl Session {
    pub fn new(paths: DataPaths) -> Self {
        Self {
            paths,
            projects: None,
            projects_origin: None,
            tps: None,
            contributors: None,
        }
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn loaded(&self) -> LoadedFlags {
        LoadedFlags {
            projects: self.projects.is_some(),
            tps: self.tps.is_some(),
            contributors: self.contributors.is_some(),
        }
    }

    pub fn projects_origin(&self) -> Option<ProjectsOrigin> {
        self.projects_origin
    }

    /// Merged projects when available, else the manual ones.
    pub fn projects(&mut self) -> Result<&[Project]> {
        if self.projects.is_none() {
            let (projects, origin) = load_site_projects(&self.paths)?;
            self.store_projects(projects, origin);
        }
        Ok(self.projects.as_deref().unwrap_or_default())
    }

    pub fn tps(&mut self) -> &[Project] {
        if self.tps.is_none() {
            match load_tps(&self.paths.tps) {
                Ok(tps) => self.tps = Some(tps),
                Err(error) => {
                    warn!(error = %format!("{error:#}"), "failed to load TPs");
                }
            }
        }
        self.tps.as_deref().unwrap_or_default()
    }

    pub fn contributors(&mut self) -> &ContributorDirectory {
        self.contributors
            .get_or_insert_with(|| ContributorDirectory::load(&self.paths.contributors))
    }

    /// Load projects and the contributor directory side by side, returning
    /// once both are in place.
    pub fn warm(&mut self) -> Result<()> {
        let need_projects = self.projects.is_none();
        let need_contributors = self.contributors.is_none();
        if !need_projects && !need_contributors {
            return Ok(());
        }

        let paths = &self.paths;
        let (projects, contributors) = thread::scope(|scope| {
            let projects = need_projects.then(|| scope.spawn(move || load_site_projects(paths)));
            let contributors = need_contributors
                .then(|| scope.spawn(move || ContributorDirectory::load(&paths.contributors)));

            let projects = projects.map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow!("project loader panicked")))
            });
            let contributors = contributors.map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| ContributorDirectory::unavailable())
            });
            (projects, contributors)
        });

        if let Some(directory) = contributors {
            self.contributors = Some(directory);
        }
        if let Some(result) = projects {
            let (projects, origin) = result?;
            self.store_projects(projects, origin);
        }
        Ok(())
    }

    /// Load whatever `route` reads, then resolve it to a view.
    pub fn view(&mut self, route: &Route) -> Result<View<'_>> {
        if route.needs_projects() {
            self.projects()?;
        }
        if route.needs_tps() {
            self.tps();
        }
        if route.is_detail() {
            self.contributors();
        }

        let empty = ContributorDirectory::default();
        let directory = self.contributors.as_ref().unwrap_or(&empty);
        let view = build_view(
            route,
            self.projects.as_deref().unwrap_or_default(),
            self.tps.as_deref().unwrap_or_default(),
            directory,
        );
        Ok(view)
    }

    fn store_projects(&mut self, projects: Vec<Project>, origin: ProjectsOrigin) {
        debug!(
            count = projects.len(),
            origin = origin.as_str(),
            "project collection ready"
        );
        self.projects = Some(projects);
        self.projects_origin = Some(origin);
    }
}

/// Prefer the merged document; fall back to the manual one when it is missing
/// or unreadable. Only a manual failure is an error.
fn load_site_projects(paths: &DataPaths) -> Result<(Vec<Project>, ProjectsOrigin)> {
    match read_optional_document::<ProjectsDocument>(&paths.merged) {
        Ok(Some(document)) => return Ok((document.projects, ProjectsOrigin::Merged)),
        Ok(None) => {
            debug!(path = %paths.merged.display(), "no merged projects file; using manual projects");
        }
        Err(error) => {
            warn!(error = %format!("{error:#}"), "merged projects file unreadable; using manual projects");
        }
    }

    let projects = load_manual_projects(&paths.manual).context("failed to load projects")?;
    Ok((projects, ProjectsOrigin::Manual))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::{ProjectsOrigin, Session};
    use crate::config::DataSection;
    use crate::route::{Route, View};
    use crate::runtime::DataPaths;

    fn data_paths(dir: &Path) -> DataPaths {
        DataPaths::in_dir(dir, &DataSection::default())
    }

    #[test]
    fn prefers_merged_document() {
        let temp = tempdir().expect("tempdir");
        let paths = data_paths(temp.path());
        fs::write(&paths.manual, r#"{"projects": [{"slug": "manual-only"}]}"#).expect("write");
        fs::write(&paths.merged, r#"{"projects": [{"slug": "merged"}]}"#).expect("write");

        let mut session = Session::new(paths);
        let projects = session.projects().expect("projects");
        assert_eq!(projects[0].slug, "merged");
        assert_eq!(session.projects_origin(), Some(ProjectsOrigin::Merged));
    }

    #[test]
    fn falls_back_to_manual_when_merged_is_missing_or_broken() {
        let temp = tempdir().expect("tempdir");
        let paths = data_paths(temp.path());
        fs::write(&paths.manual, r#"{"projects": [{"slug": "m"}]}"#).expect("write");

        let mut session = Session::new(paths.clone());
        assert_eq!(session.projects().expect("projects")[0].slug, "m");
        assert_eq!(session.projects_origin(), Some(ProjectsOrigin::Manual));

        fs::write(&paths.merged, "{ broken").expect("write");
        let mut session = Session::new(paths);
        assert_eq!(session.projects().expect("projects")[0].slug, "m");
    }

    #[test]
    fn project_load_failure_is_not_cached() {
        let temp = tempdir().expect("tempdir");
        let paths = data_paths(temp.path());
        let mut session = Session::new(paths.clone());

        let error = session.projects().expect_err("must fail");
        assert!(error.to_string().contains("failed to load projects"));
        assert!(!session.loaded().projects);

        fs::write(&paths.manual, r#"{"projects": [{"slug": "late"}]}"#).expect("write");
        assert_eq!(session.projects().expect("projects")[0].slug, "late");
        assert!(session.loaded().projects);
    }

    #[test]
    fn projects_are_memoized_after_first_load() {
        let temp = tempdir().expect("tempdir");
        let paths = data_paths(temp.path());
        fs::write(&paths.manual, r#"{"projects": [{"slug": "first"}]}"#).expect("write");
        let mut session = Session::new(paths.clone());
        session.projects().expect("projects");

        fs::write(&paths.manual, r#"{"projects": [{"slug": "second"}]}"#).expect("write");
        assert_eq!(session.projects().expect("projects")[0].slug, "first");
    }

    #[test]
    fn contributor_failure_is_cached_as_unavailable() {
        let temp = tempdir().expect("tempdir");
        let paths = data_paths(temp.path());
        let mut session = Session::new(paths.clone());
        assert!(session.contributors().is_empty());
        assert!(session.loaded().contributors);

        fs::write(
            &paths.contributors,
            r#"{"contributors": [{"id": "u1", "handle": "Ann"}]}"#,
        )
        .expect("write");
        assert!(session.contributors().is_empty());
        assert!(!session.contributors().is_available());
    }

    #[test]
    fn tps_failure_degrades_without_caching() {
        let temp = tempdir().expect("tempdir");
        let paths = data_paths(temp.path());
        let mut session = Session::new(paths.clone());
        assert!(session.tps().is_empty());
        assert!(!session.loaded().tps);

        fs::write(&paths.tps, r#"{"tps": [{"slug": "tp1"}]}"#).expect("write");
        assert_eq!(session.tps()[0].slug, "tp1");
    }

    #[test]
    fn warm_loads_projects_and_contributors() {
        let temp = tempdir().expect("tempdir");
        let paths = data_paths(temp.path());
        fs::write(&paths.manual, r#"{"projects": [{"slug": "a"}]}"#).expect("write");
        fs::write(
            &paths.contributors,
            r#"{"contributors": [{"id": "u1", "handle": "Ann"}]}"#,
        )
        .expect("write");

        let mut session = Session::new(paths);
        session.warm().expect("warm");
        let loaded = session.loaded();
        assert!(loaded.projects);
        assert!(loaded.contributors);
        assert!(!loaded.tps);
        assert_eq!(session.contributors().len(), 1);
    }

    #[test]
    fn warm_reports_missing_manual_but_keeps_contributors() {
        let temp = tempdir().expect("tempdir");
        let mut session = Session::new(data_paths(temp.path()));
        assert!(session.warm().is_err());
        assert!(session.loaded().contributors);
        assert!(!session.loaded().projects);
    }

    #[test]
    fn broken_contributor_directory_renders_no_badges() {
        let temp = tempdir().expect("tempdir");
        let paths = data_paths(temp.path());
        fs::write(
            &paths.manual,
            r#"{"projects": [{"slug": "p", "contributors": ["u1", {"id": "u1", "handle": "Ann"}]}]}"#,
        )
        .expect("write");
        fs::write(&paths.contributors, "{ broken").expect("write");

        let mut session = Session::new(paths);
        match session.view(&Route::ProjectDetail("p".to_string())).expect("view") {
            View::Detail(detail) => assert!(detail.contributors.is_empty()),
            other => panic!("unexpected view: {other:?}"),
        }
        assert!(!session.contributors().is_available());
    }

    #[test]
    fn tp_routes_do_not_require_projects() {
        let temp = tempdir().expect("tempdir");
        let paths = data_paths(temp.path());
        fs::write(&paths.tps, r#"{"tps": [{"slug": "tp1", "title": "TP 1"}]}"#).expect("write");

        let mut session = Session::new(paths);
        match session.view(&Route::TpDetail("tp1".to_string())).expect("view") {
            View::Detail(detail) => assert_eq!(detail.entity().display_title(), "TP 1"),
            other => panic!("unexpected view: {other:?}"),
        }
        assert!(session.view(&Route::Home).is_err());
    }
}
