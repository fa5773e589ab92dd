use serde::Serialize;

use crate::model::Project;

/// Which collection a detail route addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailBase {
    Project,
    Tp,
}

impl DetailBase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Tp => "tp",
        }
    }

    pub fn root_label(self) -> &'static str {
        match self {
            Self::Project => "Projets",
            Self::Tp => "TP",
        }
    }

    pub fn root_href(self) -> &'static str {
        match self {
            Self::Project => "#/",
            Self::Tp => "#/tps",
        }
    }

    pub fn detail_href(self, slug: &str) -> String {
        format!("#/{}/{}", self.as_str(), urlencoding::encode(slug))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Crumb {
    pub label: String,
    pub href: Option<String>,
}

/// A matched record and the path from its top-level ancestor down to it.
#[derive(Debug, Clone, Copy)]
pub struct Lookup<'a> {
    pub entity: &'a Project,
    parent: Option<&'a Project>,
}

impl<'a> Lookup<'a> {
    pub fn parent(&self) -> Option<&'a Project> {
        self.parent
    }

    /// `[entity]` for a top-level match, `[parent, entity]` for a sub-project.
    pub fn path(&self) -> Vec<&'a Project> {
        match self.parent {
            Some(parent) => vec![parent, self.entity],
            None => vec![self.entity],
        }
    }

    pub fn breadcrumbs(&self, base: DetailBase) -> Vec<Crumb> {
        let mut crumbs = vec![Crumb {
            label: base.root_label().to_string(),
            href: Some(base.root_href().to_string()),
        }];
        if let Some(parent) = self.parent {
            crumbs.push(Crumb {
                label: parent.display_title().to_string(),
                href: Some(base.detail_href(&parent.slug)),
            });
        }
        crumbs.push(Crumb {
            label: self.entity.display_title().to_string(),
            href: None,
        });
        crumbs
    }
}

/// Read-only slug lookups over a built collection.
#[derive(Debug, Clone, Copy)]
pub struct ProjectIndex<'a> {
    projects: &'a [Project],
}

impl<'a> ProjectIndex<'a> {
    pub fn new(projects: &'a [Project]) -> Self {
        Self { projects }
    }

    /// Scan top-level records in order, each followed by its direct
    /// sub-projects. Deeper nesting is not searched.
    pub fn find_by_slug(&self, slug: &str) -> Option<Lookup<'a>> {
        for project in self.projects {
            if project.slug == slug {
                return Some(Lookup {
                    entity: project,
                    parent: None,
                });
            }
            if let Some(sub) = project.subprojects().iter().find(|sub| sub.slug == slug) {
                return Some(Lookup {
                    entity: sub,
                    parent: Some(project),
                });
            }
        }
        None
    }
}
