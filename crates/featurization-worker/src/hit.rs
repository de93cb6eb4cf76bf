//! Registration requests queued for the featurization service.

use crate::{FeaturizationError, FeaturizationResult};
use serde::{Deserialize, Serialize};

/// Record kind written to the featurization queue.
pub const FEATURIZATION_HIT_KIND: &str = "featurization";

/// An image shown by an experience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentImage {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// A text or call-to-action shown by an experience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentText {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// Everything the service needs to featurize an experience.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceContent {
    #[serde(default)]
    pub images: Vec<ContentImage>,
    #[serde(default)]
    pub texts: Vec<ContentText>,
    #[serde(default)]
    pub ctas: Vec<ContentText>,
}

/// A queued experience registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturizationHit {
    pub experience_id: String,
    pub org_id: String,
    pub datastream_id: String,
    pub content: ExperienceContent,
    /// Recoverable failures so far. Persisted with the record.
    #[serde(default)]
    pub attempt_count: u32,
}

impl FeaturizationHit {
    pub fn new(
        experience_id: impl Into<String>,
        org_id: impl Into<String>,
        datastream_id: impl Into<String>,
        content: ExperienceContent,
    ) -> Self {
        Self {
            experience_id: experience_id.into(),
            org_id: org_id.into(),
            datastream_id: datastream_id.into(),
            content,
            attempt_count: 0,
        }
    }

    /// Rejects hits the service can never accept.
    pub fn validate(&self) -> FeaturizationResult<()> {
        let required = [
            ("experience id", &self.experience_id),
            ("org id", &self.org_id),
            ("datastream id", &self.datastream_id),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(FeaturizationError::Config(format!("{name} is empty")));
            }
        }
        Ok(())
    }
}
