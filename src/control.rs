use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::{
    models::{
        Attributes, EvaluationOptions, Properties, SplitView, Treatment, TreatmentWithConfig,
        Treatments, TreatmentsWithConfig, CONTROL,
    },
    sdk::{EventNames, Listener, OnceListener, SplitClient, SplitManager},
};

/// The control client never emits, so its event names are never used.
const CONTROL_EVENTS: EventNames = EventNames {
    ready: "",
    ready_from_cache: "",
    ready_timed_out: "",
    update: "",
};

/// Stand-in client answering every evaluation with the control treatment.
pub struct ControlClient;

#[async_trait]
impl SplitClient for ControlClient {
    fn events(&self) -> &EventNames {
        &CONTROL_EVENTS
    }

    fn on(&self, _event: &str, _listener: Listener) {}

    fn once(&self, _event: &str, _listener: OnceListener) {}

    async fn ready(&self) -> Result<()> {
        Err(anyhow!("the control client never becomes ready"))
    }

    async fn destroy(&self) -> Result<()> {
        Ok(())
    }

    fn get_treatment(
        &self,
        _feature_flag_name: &str,
        _attributes: Option<&Attributes>,
        _options: Option<&EvaluationOptions>,
    ) -> Treatment {
        CONTROL.to_string()
    }

    fn get_treatment_with_config(
        &self,
        _feature_flag_name: &str,
        _attributes: Option<&Attributes>,
        _options: Option<&EvaluationOptions>,
    ) -> TreatmentWithConfig {
        TreatmentWithConfig::control()
    }

    fn get_treatments(
        &self,
        feature_flag_names: &[String],
        _attributes: Option<&Attributes>,
        _options: Option<&EvaluationOptions>,
    ) -> Treatments {
        feature_flag_names
            .iter()
            .map(|name| (name.clone(), CONTROL.to_string()))
            .collect()
    }

    fn get_treatments_with_config(
        &self,
        feature_flag_names: &[String],
        _attributes: Option<&Attributes>,
        _options: Option<&EvaluationOptions>,
    ) -> TreatmentsWithConfig {
        feature_flag_names
            .iter()
            .map(|name| (name.clone(), TreatmentWithConfig::control()))
            .collect()
    }

    fn get_treatments_by_flag_set(
        &self,
        _flag_set: &str,
        _attributes: Option<&Attributes>,
        _options: Option<&EvaluationOptions>,
    ) -> Treatments {
        Treatments::new()
    }

    fn get_treatments_with_config_by_flag_set(
        &self,
        _flag_set: &str,
        _attributes: Option<&Attributes>,
        _options: Option<&EvaluationOptions>,
    ) -> TreatmentsWithConfig {
        TreatmentsWithConfig::new()
    }

    fn get_treatments_by_flag_sets(
        &self,
        _flag_sets: &[String],
        _attributes: Option<&Attributes>,
        _options: Option<&EvaluationOptions>,
    ) -> Treatments {
        Treatments::new()
    }

    fn get_treatments_with_config_by_flag_sets(
        &self,
        _flag_sets: &[String],
        _attributes: Option<&Attributes>,
        _options: Option<&EvaluationOptions>,
    ) -> TreatmentsWithConfig {
        TreatmentsWithConfig::new()
    }

    fn track(
        &self,
        _traffic_type: &str,
        _event_type: &str,
        _value: Option<f64>,
        _properties: Option<&Properties>,
    ) -> bool {
        false
    }
}

/// Manager used before initialization: no flags.
pub struct DefaultManager;

impl SplitManager for DefaultManager {
    fn splits(&self) -> Vec<SplitView> {
        vec![]
    }

    fn split(&self, _feature_flag_name: &str) -> Option<SplitView> {
        None
    }

    fn names(&self) -> Vec<String> {
        vec![]
    }
}
