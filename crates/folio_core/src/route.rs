use crate::contributors::{ContributorDirectory, ResolvedContributor};
use crate::index::{Crumb, DetailBase, Lookup, ProjectIndex};
use crate::model::{Media, Project, Source};

pub const REPOS_INTRO: &str =
    "Liste générée automatiquement depuis GitHub. Aucun appel API côté client.";

/// Fragment-addressed pages of the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Projects,
    Tps,
    Repos,
    ProjectDetail(String),
    TpDetail(String),
}

impl Route {
    /// Parse `#/<section>[/<slug>]`. Unknown sections fall back to home.
    pub fn parse(fragment: &str) -> Self {
        let trimmed = fragment.trim();
        let path = trimmed.strip_prefix('#').unwrap_or(trimmed);
        let path = path.strip_prefix('/').unwrap_or(path);
        let mut parts = path.split('/');
        let section = parts.next().unwrap_or("");
        let slug = parts.next().filter(|slug| !slug.is_empty()).map(decode_slug);

        match (section, slug) {
            ("projets" | "projects", _) => Self::Projects,
            ("tps", _) => Self::Tps,
            ("repos", _) => Self::Repos,
            ("project", Some(slug)) => Self::ProjectDetail(slug),
            ("tp", Some(slug)) => Self::TpDetail(slug),
            _ => Self::Home,
        }
    }

    pub fn fragment(&self) -> String {
        match self {
            Self::Home => "#/".to_string(),
            Self::Projects => "#/projets".to_string(),
            Self::Tps => "#/tps".to_string(),
            Self::Repos => "#/repos".to_string(),
            Self::ProjectDetail(slug) => DetailBase::Project.detail_href(slug),
            Self::TpDetail(slug) => DetailBase::Tp.detail_href(slug),
        }
    }

    /// Navigation entry highlighted for this route.
    pub fn nav_label(&self) -> &'static str {
        match self {
            Self::Projects => "Projets",
            Self::Tps => "TP",
            Self::Repos => "Repos",
            Self::Home | Self::ProjectDetail(_) | Self::TpDetail(_) => "Accueil",
        }
    }

    pub fn needs_projects(&self) -> bool {
        !matches!(self, Self::Tps | Self::TpDetail(_))
    }

    pub fn needs_tps(&self) -> bool {
        matches!(self, Self::Tps | Self::TpDetail(_))
    }

    pub fn is_detail(&self) -> bool {
        matches!(self, Self::ProjectDetail(_) | Self::TpDetail(_))
    }
}

#[derive(Debug, Clone)]
pub enum View<'a> {
    List(ListView<'a>),
    Detail(DetailView<'a>),
    NotFound { base: DetailBase, slug: String },
}

#[derive(Debug, Clone)]
pub struct ListView<'a> {
    pub heading: Option<&'static str>,
    pub intro: Option<&'static str>,
    pub base: DetailBase,
    pub pinned: Vec<&'a Project>,
    /// Pinned records first, then the rest, each group in stored order.
    pub all: Vec<&'a Project>,
    pub include_about: bool,
}

impl<'a> ListView<'a> {
    fn new<I>(heading: Option<&'static str>, base: DetailBase, records: I) -> Self
    where
        I: IntoIterator<Item = &'a Project>,
    {
        let (pinned, rest): (Vec<&Project>, Vec<&Project>) =
            records.into_iter().partition(|project| project.is_pinned());
        let all = pinned.iter().chain(rest.iter()).copied().collect();
        Self {
            heading,
            intro: None,
            base,
            pinned,
            all,
            include_about: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetailView<'a> {
    pub base: DetailBase,
    pub lookup: Lookup<'a>,
    pub breadcrumbs: Vec<Crumb>,
    pub contributors: Vec<ResolvedContributor>,
    /// Renderable media; unknown types are left out.
    pub media: Vec<Media>,
}

impl<'a> DetailView<'a> {
    pub fn entity(&self) -> &'a Project {
        self.lookup.entity
    }
}

/// Resolve a route against loaded collections.
pub fn build_view<'a>(
    route: &Route,
    projects: &'a [Project],
    tps: &'a [Project],
    directory: &ContributorDirectory,
) -> View<'a> {
    let manual = move || {
        projects
            .iter()
            .filter(|project| project.effective_source() == Source::Manual)
    };

    match route {
        Route::Home => View::List(ListView {
            include_about: true,
            ..ListView::new(None, DetailBase::Project, manual())
        }),
        Route::Projects => View::List(ListView::new(
            Some("Projets"),
            DetailBase::Project,
            manual(),
        )),
        Route::Tps => View::List(ListView::new(Some("TP"), DetailBase::Tp, tps)),
        Route::Repos => View::List(ListView {
            intro: Some(REPOS_INTRO),
            ..ListView::new(
                Some("Repos"),
                DetailBase::Project,
                projects
                    .iter()
                    .filter(|project| project.source == Some(Source::Auto)),
            )
        }),
        Route::ProjectDetail(slug) => detail_view(projects, DetailBase::Project, slug, directory),
        Route::TpDetail(slug) => detail_view(tps, DetailBase::Tp, slug, directory),
    }
}

fn detail_view<'a>(
    collection: &'a [Project],
    base: DetailBase,
    slug: &str,
    directory: &ContributorDirectory,
) -> View<'a> {
    match ProjectIndex::new(collection).find_by_slug(slug) {
        Some(lookup) => View::Detail(DetailView {
            base,
            breadcrumbs: lookup.breadcrumbs(base),
            contributors: directory.resolve_all(lookup.entity.contributors()),
            media: lookup
                .entity
                .media()
                .iter()
                .filter_map(|item| item.as_media())
                .collect(),
            lookup,
        }),
        None => View::NotFound {
            base,
            slug: slug.to_string(),
        },
    }
}

fn decode_slug(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
