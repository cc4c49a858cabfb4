//! Contract of the wrapped feature flag SDK.
//!
//! The service never evaluates flags itself; it drives whatever implements
//! these traits. [`crate::localhost`] ships an in-memory implementation.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    config::SplitConfig,
    models::{
        Attributes, EvaluationOptions, Properties, SplitKey, SplitView, Treatment,
        TreatmentWithConfig, Treatments, TreatmentsWithConfig,
    },
};

/// Callback invoked on every occurrence of an event.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Callback invoked on the next occurrence of an event only.
pub type OnceListener = Box<dyn FnOnce() + Send>;

/// Lifecycle events emitted by an SDK client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdkEvent {
    Ready,
    ReadyFromCache,
    ReadyTimedOut,
    Update,
}

impl SdkEvent {
    pub const ALL: [SdkEvent; 4] = [
        SdkEvent::Ready,
        SdkEvent::ReadyFromCache,
        SdkEvent::ReadyTimedOut,
        SdkEvent::Update,
    ];

    /// One-shot events fire at most once per client and are replayed to late
    /// subscribers. `Update` repeats and is never replayed.
    pub fn is_one_shot(self) -> bool {
        !matches!(self, SdkEvent::Update)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            SdkEvent::Ready => 0,
            SdkEvent::ReadyFromCache => 1,
            SdkEvent::ReadyTimedOut => 2,
            SdkEvent::Update => 3,
        }
    }
}

/// Event name strings as defined by a given SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventNames {
    pub ready: &'static str,
    pub ready_from_cache: &'static str,
    pub ready_timed_out: &'static str,
    pub update: &'static str,
}

impl EventNames {
    pub fn name(&self, event: SdkEvent) -> &'static str {
        match event {
            SdkEvent::Ready => self.ready,
            SdkEvent::ReadyFromCache => self.ready_from_cache,
            SdkEvent::ReadyTimedOut => self.ready_timed_out,
            SdkEvent::Update => self.update,
        }
    }
}

/// Builds SDK instances from a configuration.
pub trait SplitFactory: Send + Sync {
    /// `version` identifies this wrapper to the SDK for tracking purposes.
    fn create(&self, config: &SplitConfig, version: &str) -> Result<Arc<dyn SplitSdk>>;
}

pub trait SplitSdk: Send + Sync {
    /// The client for `key`, or the main client when `key` is `None`.
    fn client(&self, key: Option<&SplitKey>) -> Arc<dyn SplitClient>;

    fn manager(&self) -> Arc<dyn SplitManager>;
}

#[async_trait]
pub trait SplitClient: Send + Sync {
    fn events(&self) -> &EventNames;

    fn on(&self, event: &str, listener: Listener);

    fn once(&self, event: &str, listener: OnceListener);

    /// Resolves once the client is ready. A timeout does not end the wait.
    async fn ready(&self) -> Result<()>;

    async fn destroy(&self) -> Result<()>;

    fn get_treatment(
        &self,
        feature_flag_name: &str,
        attributes: Option<&Attributes>,
        options: Option<&EvaluationOptions>,
    ) -> Treatment;

    fn get_treatment_with_config(
        &self,
        feature_flag_name: &str,
        attributes: Option<&Attributes>,
        options: Option<&EvaluationOptions>,
    ) -> TreatmentWithConfig;

    fn get_treatments(
        &self,
        feature_flag_names: &[String],
        attributes: Option<&Attributes>,
        options: Option<&EvaluationOptions>,
    ) -> Treatments;

    fn get_treatments_with_config(
        &self,
        feature_flag_names: &[String],
        attributes: Option<&Attributes>,
        options: Option<&EvaluationOptions>,
    ) -> TreatmentsWithConfig;

    fn get_treatments_by_flag_set(
        &self,
        flag_set: &str,
        attributes: Option<&Attributes>,
        options: Option<&EvaluationOptions>,
    ) -> Treatments;

    fn get_treatments_with_config_by_flag_set(
        &self,
        flag_set: &str,
        attributes: Option<&Attributes>,
        options: Option<&EvaluationOptions>,
    ) -> TreatmentsWithConfig;

    fn get_treatments_by_flag_sets(
        &self,
        flag_sets: &[String],
        attributes: Option<&Attributes>,
        options: Option<&EvaluationOptions>,
    ) -> Treatments;

    fn get_treatments_with_config_by_flag_sets(
        &self,
        flag_sets: &[String],
        attributes: Option<&Attributes>,
        options: Option<&EvaluationOptions>,
    ) -> TreatmentsWithConfig;

    fn track(
        &self,
        traffic_type: &str,
        event_type: &str,
        value: Option<f64>,
        properties: Option<&Properties>,
    ) -> bool;
}

pub trait SplitManager: Send + Sync {
    fn splits(&self) -> Vec<SplitView>;

    fn split(&self, feature_flag_name: &str) -> Option<SplitView>;

    fn names(&self) -> Vec<String>;
}
