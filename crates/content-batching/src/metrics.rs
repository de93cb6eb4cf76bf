//! Aggregation of event batches into per-content metrics.

use crate::event::{AssetEvent, BufferedEvent, ExperienceEvent, Extras, InteractionType};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Grouping key: content identity plus location (empty when absent).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricsKey {
    pub identity: String,
    pub location: String,
}

impl MetricsKey {
    pub fn new(identity: impl Into<String>, location: Option<&str>) -> Self {
        Self {
            identity: identity.into(),
            location: location.unwrap_or_default().to_string(),
        }
    }

    fn location(&self) -> Option<String> {
        (!self.location.is_empty()).then(|| self.location.clone())
    }
}

/// Interaction counts for one asset at one location.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMetrics {
    pub asset_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub view_count: u64,
    pub click_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extras: Option<Extras>,
}

/// Interaction counts for one experience at one location.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceMetrics {
    pub experience_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub view_count: u64,
    pub click_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extras: Option<Extras>,
}

#[derive(Default)]
struct Group<'a> {
    views: u64,
    clicks: u64,
    extras: Vec<&'a Extras>,
}

fn group_by<'a, E: BufferedEvent>(
    events: &'a [E],
    parts: impl Fn(&'a E) -> (InteractionType, Option<&'a Extras>),
) -> BTreeMap<MetricsKey, Group<'a>> {
    let mut groups: BTreeMap<MetricsKey, Group<'a>> = BTreeMap::new();
    for event in events {
        let group = groups.entry(event.metrics_key()).or_default();
        let (interaction, extras) = parts(event);
        match interaction {
            InteractionType::View => group.views += 1,
            InteractionType::Click => group.clicks += 1,
        }
        if let Some(extras) = extras {
            group.extras.push(extras);
        }
    }
    groups
}

/// Groups asset events by (asset URL, location) and counts interactions.
pub fn aggregate_assets(events: &[AssetEvent]) -> BTreeMap<MetricsKey, AssetMetrics> {
    group_by(events, |e| (e.interaction, e.extras.as_ref()))
        .into_iter()
        .map(|(key, group)| {
            let metrics = AssetMetrics {
                asset_url: key.identity.clone(),
                location: key.location(),
                view_count: group.views,
                click_count: group.clicks,
                extras: merge_extras(&group.extras),
            };
            (key, metrics)
        })
        .collect()
}

/// Groups experience events by (experience id, location) and counts interactions.
pub fn aggregate_experiences(events: &[ExperienceEvent]) -> BTreeMap<MetricsKey, ExperienceMetrics> {
    group_by(events, |e| (e.interaction, e.extras.as_ref()))
        .into_iter()
        .map(|(key, group)| {
            let metrics = ExperienceMetrics {
                experience_id: key.identity.clone(),
                location: key.location(),
                view_count: group.views,
                click_count: group.clicks,
                extras: merge_extras(&group.extras),
            };
            (key, metrics)
        })
        .collect()
}

/// Combines the extras of one group.
///
/// Empty maps count as absent. A single map passes through. Several maps
/// are merged key by key when no key carries two different values
/// (different JSON types count as different); otherwise every map is kept,
/// in arrival order, under `"all"`.
pub fn merge_extras(extras: &[&Extras]) -> Option<Extras> {
    let present: Vec<&Extras> = extras.iter().copied().filter(|e| !e.is_empty()).collect();

    match present.as_slice() {
        [] => None,
        [single] => Some((*single).clone()),
        many => {
            let mut merged = Extras::new();
            for map in many {
                for (key, value) in map.iter() {
                    match merged.get(key) {
                        Some(existing) if existing != value => return Some(keep_all(many)),
                        Some(_) => {}
                        None => {
                            merged.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
            Some(merged)
        }
    }
}

fn keep_all(maps: &[&Extras]) -> Extras {
    let all = maps.iter().map(|m| Value::Object((*m).clone())).collect();
    let mut wrapped = Extras::new();
    wrapped.insert("all".to_string(), Value::Array(all));
    wrapped
}
