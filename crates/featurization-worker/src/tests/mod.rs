//! Featurization worker tests.
//!
//! - `protocol.rs`: check/register outcomes, backoff persistence, consent
//! - `worker.rs`: the background task driving the processor


use crate::{
    BackoffPolicy, ExperienceContent, FeaturizationClient, FeaturizationError, FeaturizationHit,
    FeaturizationHitProcessor, FeaturizationResult,
};
use async_trait::async_trait;
use hit_store::{HitStore, MemoryHitStore};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A call observed by [`ScriptedClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Check(String),
    Register(String),
}

/// Client answering from scripted results. With nothing scripted, checks
/// report "not registered" and registrations succeed.
#[derive(Default)]
pub(crate) struct ScriptedClient {
    checks: Mutex<VecDeque<FeaturizationResult<bool>>>,
    registers: Mutex<VecDeque<FeaturizationResult<()>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_check(&self, result: FeaturizationResult<bool>) -> &Self {
        self.checks.lock().unwrap().push_back(result);
        self
    }

    pub fn on_register(&self, result: FeaturizationResult<()>) -> &Self {
        self.registers.lock().unwrap().push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeaturizationClient for ScriptedClient {
    async fn check_exists(&self, hit: &FeaturizationHit) -> FeaturizationResult<bool> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Check(hit.experience_id.clone()));
        self.checks.lock().unwrap().pop_front().unwrap_or(Ok(false))
    }

    async fn register(&self, hit: &FeaturizationHit) -> FeaturizationResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Register(hit.experience_id.clone()));
        self.registers.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

pub(crate) fn http(status: u16) -> FeaturizationError {
    FeaturizationError::Http {
        status,
        message: format!("status {status}"),
    }
}

pub(crate) fn hit(experience_id: &str) -> FeaturizationHit {
    FeaturizationHit::new(experience_id, "ORG@AdobeOrg", "ds-1", ExperienceContent::default())
}

pub(crate) fn processor_with(
    client: &Arc<ScriptedClient>,
    store: Box<dyn HitStore>,
) -> FeaturizationHitProcessor {
    FeaturizationHitProcessor::new(
        Arc::clone(client) as Arc<dyn FeaturizationClient>,
        store,
        BackoffPolicy::default(),
    )
}

pub(crate) fn processor(client: &Arc<ScriptedClient>) -> FeaturizationHitProcessor {
    processor_with(client, Box::new(MemoryHitStore::new()))
}
