use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::model::{Project, Source};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateSlug {
    pub slug: String,
    pub origin: Source,
    pub occurrences: usize,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub projects: Vec<Project>,
    /// Slugs present in both inputs, in output order.
    pub enriched: Vec<String>,
    /// Slugs only the automatic input carried.
    pub auto_only: Vec<String>,
    pub duplicates: Vec<DuplicateSlug>,
}

/// Combine a manual record with the automatic record sharing its slug.
///
/// The manual side wins whenever it holds a value; the automatic side only
/// fills gaps. Strings count as missing when empty. Lists are never merged
/// element-wise: a present list wins even when empty.
pub fn merge_records(manual: &Project, auto: &Project) -> Project {
    let mut out = manual.clone();

    fill_text(&mut out.title, &auto.title);
    fill_text(&mut out.summary, &auto.summary);
    fill_text(&mut out.description, &auto.description);
    fill_text(&mut out.status, &auto.status);
    fill_text(&mut out.period, &auto.period);
    fill_text(&mut out.role, &auto.role);
    fill_text(&mut out.github, &auto.github);
    fill_text(&mut out.demo, &auto.demo);
    fill_text(&mut out.cover, &auto.cover);

    fill(&mut out.tags, &auto.tags);
    fill(&mut out.tech, &auto.tech);
    fill(&mut out.media, &auto.media);
    fill(&mut out.contributors, &auto.contributors);
    fill(&mut out.subprojects, &auto.subprojects);
    fill(&mut out.source, &auto.source);
    fill(&mut out.pinned, &auto.pinned);

    for (key, incoming) in &auto.extra {
        merge_field(&mut out.extra, key, incoming);
    }

    out
}

/// Merge two manual/automatic collections keyed by slug.
///
/// Output holds the manual records in their order, then the automatic-only
/// records in fetch order. A slug repeated inside one input keeps the
/// position of its first occurrence and the content of its last one; each
/// repeat is reported in [`MergeOutcome::duplicates`].
pub fn merge_collections(manual: &[Project], auto: &[Project]) -> MergeOutcome {
    let (manual_unique, mut duplicates) = collapse_by_slug(manual, Source::Manual);
    let (auto_unique, auto_duplicates) = collapse_by_slug(auto, Source::Auto);
    duplicates.extend(auto_duplicates);

    let mut projects = Vec::with_capacity(manual_unique.len() + auto_unique.len());
    let mut position = HashMap::new();
    for mut record in manual_unique {
        record.source.get_or_insert(Source::Manual);
        position.insert(record.slug.clone(), projects.len());
        projects.push(record);
    }

    let mut enriched = Vec::new();
    let mut auto_only = Vec::new();
    for mut record in auto_unique {
        match position.get(&record.slug) {
            Some(&index) => {
                debug!(slug = %record.slug, "merging automatic data into manual record");
                projects[index] = merge_records(&projects[index], &record);
                enriched.push(record.slug);
            }
            None => {
                record.source.get_or_insert(Source::Auto);
                position.insert(record.slug.clone(), projects.len());
                auto_only.push(record.slug.clone());
                projects.push(record);
            }
        }
    }

    enriched.sort_by_key(|slug| position.get(slug).copied());

    MergeOutcome {
        projects,
        enriched,
        auto_only,
        duplicates,
    }
}

fn collapse_by_slug(records: &[Project], origin: Source) -> (Vec<Project>, Vec<DuplicateSlug>) {
    let mut unique: Vec<Project> = Vec::with_capacity(records.len());
    let mut position = HashMap::new();
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();

    for record in records {
        *counts.entry(record.slug.as_str()).or_default() += 1;
        match position.get(record.slug.as_str()) {
            Some(&index) => unique[index] = record.clone(),
            None => {
                position.insert(record.slug.as_str(), unique.len());
                unique.push(record.clone());
            }
        }
    }

    let duplicates = counts
        .into_iter()
        .filter(|(_, occurrences)| *occurrences > 1)
        .map(|(slug, occurrences)| {
            warn!(
                slug,
                occurrences,
                origin = origin.as_str(),
                "duplicate slug; keeping the last definition"
            );
            DuplicateSlug {
                slug: slug.to_string(),
                origin,
                occurrences,
            }
        })
        .collect();

    (unique, duplicates)
}

fn fill_text(slot: &mut Option<String>, incoming: &Option<String>) {
    if slot.as_deref().is_none_or(str::is_empty) && incoming.is_some() {
        slot.clone_from(incoming);
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(incoming);
    }
}

fn merge_field(target: &mut BTreeMap<String, Value>, key: &str, incoming: &Value) {
    match target.get_mut(key) {
        None => {
            target.insert(key.to_string(), incoming.clone());
        }
        Some(existing) => merge_value(existing, incoming),
    }
}

fn merge_value(existing: &mut Value, incoming: &Value) {
    if is_missing(existing) {
        *existing = incoming.clone();
        return;
    }
    if let (Value::Object(current), Value::Object(update)) = (existing, incoming) {
        merge_object(current, update);
    }
}

fn merge_object(current: &mut Map<String, Value>, update: &Map<String, Value>) {
    for (key, incoming) in update {
        match current.get_mut(key) {
            None => {
                current.insert(key.clone(), incoming.clone());
            }
            Some(existing) => merge_value(existing, incoming),
        }
    }
}

fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}
