use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use folio_core::config::load_config;
use folio_core::github::{GitHubClientConfig, fetch_to_file};
use folio_core::loader::{load_contributor_entries, load_manual_projects, read_optional_document};
use folio_core::model::{ContributorRef, Media, Project, ProjectsDocument, TpsDocument};
use folio_core::pipeline::{MergeOptions, MergeStatus, run_merge};
use folio_core::route::{DetailView, ListView, Route, View};
use folio_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, init_layout,
    inspect_runtime, resolve_paths,
};
use folio_core::session::Session;
use tracing::{debug, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(
    name = "folio",
    version,
    about = "Portfolio data tooling: fetch repositories, merge project lists, inspect routes"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(long, global = true, help = "Emit logs as JSON lines on stderr")]
    log_json: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            data_dir: cli.data_dir.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create the data directory, config file and empty documents")]
    Init(InitArgs),
    #[command(about = "Show resolved paths, document presence and record counts")]
    Status,
    #[command(about = "List public repositories and write the automatic projects file")]
    Fetch(FetchArgs),
    #[command(about = "Merge manual and automatic projects into the merged file")]
    Merge(MergeArgs),
    #[command(about = "Render a site route such as #/project/<slug> as text")]
    Show(ShowArgs),
    #[command(about = "List the contributor directory and how references resolve")]
    Contributors,
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

#[derive(Debug, Args)]
struct FetchArgs {
    #[arg(long, value_name = "NAME", help = "GitHub account (overrides GH_USER and config)")]
    user: Option<String>,
}

#[derive(Debug, Args)]
struct MergeArgs {
    #[arg(long, help = "Write nothing; fail with a diff when the merged file is stale")]
    check: bool,
    #[arg(long, help = "Fail when an input repeats a slug")]
    strict: bool,
}

#[derive(Debug, Args)]
struct ShowArgs {
    #[arg(default_value = "#/", help = "Route fragment, e.g. #/projets or #/tp/<slug>")]
    route: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Status) => run_status(&runtime),
        Some(Commands::Fetch(args)) => run_fetch(&runtime, args),
        Some(Commands::Merge(args)) => run_merge_command(&runtime, args),
        Some(Commands::Show(args)) => run_show(&runtime, args),
        Some(Commands::Contributors) => run_contributors(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env("FOLIO_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(io::stderr)).init();
    }
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let data = paths.data_paths(&config);
    let report = init_layout(&paths, &data, &InitOptions { force: args.force })?;

    println!("Initialized folio layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("data_dir: {}", normalize_path(&paths.data_dir));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    for path in &report.seeded_files {
        println!("seeded: {}", normalize_path(path));
    }
    print_diagnostics(runtime, &paths);

    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let data = paths.data_paths(&config);
    let status = inspect_runtime(&paths, &data);

    println!("runtime status");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!(
        "project_root_exists: {}",
        format_flag(status.project_root_exists)
    );
    println!("data_dir_exists: {}", format_flag(status.data_dir_exists));
    println!("config_exists: {}", format_flag(status.config_exists));
    println!(
        "github_user: {}",
        config.github_user().as_deref().unwrap_or("<unset>")
    );
    print_document_status("manual", &data.manual, status.manual_exists, || {
        load_manual_projects(&data.manual).map(|projects| projects.len())
    });
    print_document_status("auto", &data.auto, status.auto_exists, || {
        count_projects(&data.auto)
    });
    print_document_status("merged", &data.merged, status.merged_exists, || {
        count_projects(&data.merged)
    });
    print_document_status("tps", &data.tps, status.tps_exists, || {
        read_optional_document::<TpsDocument>(&data.tps)
            .map(|document| document.map_or(0, |document| document.tps.len()))
    });
    print_document_status(
        "contributors",
        &data.contributors,
        status.contributors_exists,
        || load_contributor_entries(&data.contributors).map(|entries| entries.len()),
    );
    if !status.warnings.is_empty() {
        println!("warnings:");
        for warning in &status.warnings {
            println!("  - {warning}");
        }
    }
    print_diagnostics(runtime, &paths);

    Ok(())
}

fn run_fetch(runtime: &RuntimeOptions, args: FetchArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let data = paths.data_paths(&config);
    let client_config = GitHubClientConfig::from_config(&config, args.user.as_deref())?;
    let report = fetch_to_file(client_config, &data.auto)?;

    println!("fetch");
    println!("user: {}", report.user);
    println!("pages: {}", report.pages);
    println!("requests: {}", report.request_count);
    println!("forks_skipped: {}", report.forks_skipped);
    println!("projects: {}", report.projects);
    println!("output: {}", normalize_path(&report.output_path));
    println!("output_hash: {}", report.output_hash);
    print_diagnostics(runtime, &paths);

    Ok(())
}

fn run_merge_command(runtime: &RuntimeOptions, args: MergeArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let data = paths.data_paths(&config);
    let report = run_merge(
        &data,
        &MergeOptions {
            check: args.check,
            strict: args.strict,
        },
    )?;

    println!("merge");
    println!("manual: {}", report.manual_count);
    println!("auto: {}", report.auto_count);
    println!("merged: {}", report.merged_count);
    println!("enriched: {}", join_or_none(&report.enriched));
    println!("auto_only: {}", join_or_none(&report.auto_only));
    for duplicate in &report.duplicates {
        println!(
            "duplicate: {} ({} x{})",
            duplicate.slug,
            duplicate.origin.as_str(),
            duplicate.occurrences
        );
    }
    println!("output: {}", normalize_path(&report.output_path));
    println!("output_hash: {}", report.output_hash);
    println!("status: {}", report.status.as_str());
    print_diagnostics(runtime, &paths);

    if let MergeStatus::Stale { diff } = &report.status {
        print!("{diff}");
        bail!("merged projects file is stale; run `folio merge` to regenerate it");
    }
    Ok(())
}

fn run_show(runtime: &RuntimeOptions, args: ShowArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let mut session = Session::new(paths.data_paths(&config));
    let route = Route::parse(&args.route);
    debug!(input = %args.route, route = %route.fragment(), "resolved route");
    if route.needs_projects() && route.is_detail() {
        session.warm()?;
    }

    println!("route: {}", route.fragment());
    println!("nav: {}", route.nav_label());
    match session.view(&route)? {
        View::List(list) => print_list_view(&list),
        View::Detail(detail) => print_detail_view(&detail),
        View::NotFound { base, slug } => {
            println!("not_found: {slug}");
            println!("back: {} ({})", base.root_label(), base.root_href());
        }
    }
    if let Some(origin) = session.projects_origin() {
        println!("projects_source: {}", origin.as_str());
    }
    print_diagnostics(runtime, &paths);

    Ok(())
}

fn run_contributors(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let mut session = Session::new(paths.data_paths(&config));

    let directory = session.contributors().clone();
    println!("directory_available: {}", format_flag(directory.is_available()));
    println!("contributors: {}", directory.len());
    for (id, identity) in directory.iter() {
        println!(
            "  {id}: {} {}",
            identity.handle,
            identity.url.as_deref().unwrap_or("<no url>")
        );
    }

    println!("references:");
    let projects: &[Project] = match session.projects() {
        Ok(projects) => projects,
        Err(error) => {
            warn!(error = %format!("{error:#}"), "projects unavailable; skipping references");
            &[]
        }
    };
    let mut total = 0usize;
    for project in projects {
        for (slug, reference) in project_references(project) {
            total += 1;
            let resolution = match directory.resolve(reference) {
                Some(resolved) => format!(
                    "{} [{}]",
                    resolved.handle,
                    directory.classify(reference).as_str()
                ),
                None if !directory.is_available() => "<hidden: directory unavailable>".to_string(),
                None => "<dropped: no handle>".to_string(),
            };
            println!("  {slug}: {} -> {resolution}", describe_reference(reference));
        }
    }
    if total == 0 {
        println!("  <none>");
    }
    print_diagnostics(runtime, &paths);

    Ok(())
}

fn print_list_view(list: &ListView<'_>) {
    if let Some(heading) = list.heading {
        println!("heading: {heading}");
    }
    if let Some(intro) = list.intro {
        println!("intro: {intro}");
    }
    if list.include_about {
        println!("about: yes");
    }
    if !list.pinned.is_empty() {
        println!("pinned:");
        for project in &list.pinned {
            print_card(list, project);
        }
    }
    println!("items: {}", list.all.len());
    for project in &list.all {
        print_card(list, project);
    }
}

fn print_card(list: &ListView<'_>, project: &Project) {
    println!(
        "  - {} | {} | {}",
        project.display_title(),
        project.summary.as_deref().unwrap_or(""),
        list.base.detail_href(&project.slug)
    );
}

fn print_detail_view(detail: &DetailView<'_>) {
    let project = detail.entity();
    let crumbs = detail
        .breadcrumbs
        .iter()
        .map(|crumb| match &crumb.href {
            Some(href) => format!("{} ({href})", crumb.label),
            None => crumb.label.clone(),
        })
        .collect::<Vec<_>>()
        .join(" > ");
    println!("breadcrumbs: {crumbs}");
    println!("title: {}", project.display_title());
    print_optional("summary", project.summary.as_deref());
    print_optional("description", project.description.as_deref());
    print_optional("status", project.status.as_deref());
    print_optional("period", project.period.as_deref());
    print_optional("role", project.role.as_deref());
    print_optional("github", project.github.as_deref());
    print_optional("demo", project.demo.as_deref());
    print_optional("cover", project.cover_image());
    if !project.tags().is_empty() {
        println!("tags: {}", project.tags().join(", "));
    }
    if !project.tech().is_empty() {
        println!("tech: {}", project.tech().join(", "));
    }
    for contributor in &detail.contributors {
        let mut line = contributor.handle.clone();
        if let Some(role) = &contributor.role {
            line.push_str(&format!(" ({role})"));
        }
        if let Some(url) = &contributor.url {
            line.push_str(&format!(" <{url}>"));
        }
        println!("contributor: {line}");
    }
    for media in &detail.media {
        println!("media: {}", describe_media(media));
    }
    for item in project.media() {
        if item.as_media().is_none() {
            debug!(
                slug = %project.slug,
                kind = item.kind().unwrap_or("<untyped>"),
                "skipping media that cannot be rendered"
            );
        }
    }
    for sub in project.subprojects() {
        println!(
            "subproject: {} {}",
            sub.display_title(),
            detail.base.detail_href(&sub.slug)
        );
    }
}

fn describe_media(media: &Media) -> String {
    match media {
        Media::Image { src, caption } => with_caption(format!("image {src}"), caption),
        Media::Pdf { src, caption } => with_caption(format!("pdf {src}"), caption),
        Media::Video {
            src,
            sources,
            poster,
            caption,
        } => {
            let mut line = "video".to_string();
            if let Some(src) = src {
                line.push_str(&format!(" {src}"));
            }
            for source in sources {
                line.push_str(&format!(" {}", source.src));
            }
            if let Some(poster) = poster {
                line.push_str(&format!(" poster={poster}"));
            }
            with_caption(line, caption)
        }
        Media::Link { href, caption } => with_caption(format!("link {href}"), caption),
    }
}

fn with_caption(line: String, caption: &Option<String>) -> String {
    match caption {
        Some(caption) if !caption.is_empty() => format!("{line} \"{caption}\""),
        _ => line,
    }
}

/// Every contributor reference of a record and its sub-projects.
fn project_references(project: &Project) -> Vec<(&str, &ContributorRef)> {
    let mut references: Vec<(&str, &ContributorRef)> = project
        .contributors()
        .iter()
        .map(|reference| (project.slug.as_str(), reference))
        .collect();
    for sub in project.subprojects() {
        references.extend(
            sub.contributors()
                .iter()
                .map(|reference| (sub.slug.as_str(), reference)),
        );
    }
    references
}

fn describe_reference(reference: &ContributorRef) -> String {
    match reference {
        ContributorRef::Name(name) => format!("\"{name}\""),
        ContributorRef::Structured(structured) => serde_json::to_string(structured)
            .unwrap_or_else(|_| "<unprintable>".to_string()),
    }
}

fn print_document_status<F>(label: &str, path: &Path, exists: bool, count: F)
where
    F: FnOnce() -> Result<usize>,
{
    println!("{label}.path: {}", normalize_path(path));
    println!("{label}.exists: {}", format_flag(exists));
    if exists {
        match count() {
            Ok(count) => println!("{label}.records: {count}"),
            Err(error) => println!("{label}.records: <unreadable: {error:#}>"),
        }
    }
}

fn count_projects(path: &Path) -> Result<usize> {
    read_optional_document::<ProjectsDocument>(path)
        .map(|document| document.map_or(0, |document| document.projects.len()))
}

fn print_optional(label: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|value| !value.is_empty()) {
        println!("{label}: {value}");
    }
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn join_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "<none>".to_string()
    } else {
        values.join(", ")
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        data_dir: runtime.data_dir.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::Cli;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
