//! Content interaction events.

use crate::metrics::MetricsKey;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Free-form per-event key/value attributes.
pub type Extras = Map<String, Value>;

/// What the user did with the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    View,
    Click,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Click => "click",
        }
    }
}

impl std::fmt::Display for InteractionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which queue an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Asset,
    Experience,
}

/// An interaction with a single asset (image, video, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetEvent {
    pub id: String,
    pub asset_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub interaction: InteractionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<Extras>,
    pub created_at: DateTime<Utc>,
}

impl AssetEvent {
    pub fn new(asset_url: impl Into<String>, interaction: InteractionType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            asset_url: asset_url.into(),
            location: None,
            interaction,
            extras: None,
            created_at: Utc::now(),
        }
    }

    pub fn view(asset_url: impl Into<String>) -> Self {
        Self::new(asset_url, InteractionType::View)
    }

    pub fn click(asset_url: impl Into<String>) -> Self {
        Self::new(asset_url, InteractionType::Click)
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_extras(mut self, extras: Extras) -> Self {
        self.extras = Some(extras);
        self
    }
}

/// An interaction with an experience (a composed unit of assets, texts and CTAs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceEvent {
    pub id: String,
    pub experience_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub interaction: InteractionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<Extras>,
    pub created_at: DateTime<Utc>,
}

impl ExperienceEvent {
    pub fn new(experience_id: impl Into<String>, interaction: InteractionType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            experience_id: experience_id.into(),
            location: None,
            interaction,
            extras: None,
            created_at: Utc::now(),
        }
    }

    pub fn view(experience_id: impl Into<String>) -> Self {
        Self::new(experience_id, InteractionType::View)
    }

    pub fn click(experience_id: impl Into<String>) -> Self {
        Self::new(experience_id, InteractionType::Click)
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_extras(mut self, extras: Extras) -> Self {
        self.extras = Some(extras);
        self
    }
}

/// Either kind of event, as accepted by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum ContentEvent {
    Asset(AssetEvent),
    Experience(ExperienceEvent),
}

impl ContentEvent {
    pub fn category(&self) -> EventCategory {
        match self {
            Self::Asset(_) => EventCategory::Asset,
            Self::Experience(_) => EventCategory::Experience,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Asset(e) => &e.id,
            Self::Experience(e) => &e.id,
        }
    }
}

impl From<AssetEvent> for ContentEvent {
    fn from(event: AssetEvent) -> Self {
        Self::Asset(event)
    }
}

impl From<ExperienceEvent> for ContentEvent {
    fn from(event: ExperienceEvent) -> Self {
        Self::Experience(event)
    }
}

/// An event that can sit in a [`crate::PersistentHitQueue`].
pub trait BufferedEvent: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Record kind written to the store.
    const KIND: &'static str;

    /// Unique event identifier used for dedup and confirmation.
    fn event_id(&self) -> &str;

    /// Group this event is counted under when a batch is aggregated.
    fn metrics_key(&self) -> MetricsKey;
}

impl BufferedEvent for AssetEvent {
    const KIND: &'static str = "asset";

    fn event_id(&self) -> &str {
        &self.id
    }

    fn metrics_key(&self) -> MetricsKey {
        MetricsKey::new(self.asset_url.as_str(), self.location.as_deref())
    }
}

impl BufferedEvent for ExperienceEvent {
    const KIND: &'static str = "experience";

    fn event_id(&self) -> &str {
        &self.id
    }

    fn metrics_key(&self) -> MetricsKey {
        MetricsKey::new(self.experience_id.as_str(), self.location.as_deref())
    }
}
