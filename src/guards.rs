//! Route guards deciding access from the SDK state.
//!
//! Every guard answers from the current state and never waits: a guard
//! checked before the main client is ready denies access.

use std::sync::Arc;

use serde_json::Value;
use tracing::{event, Level};

use crate::{deprecation::deprecated, models::Attributes, service::SplitService};

type AttributesFn = Arc<dyn Fn() -> Attributes + Send + Sync>;

/// Allows access once the main client is ready.
pub fn ready_guard(service: &SplitService) -> bool {
    let ready = service.is_sdk_ready();
    if !ready {
        event!(Level::WARN, "SDK not ready, blocking navigation");
    }
    ready
}

/// Same as [`ready_guard`], for route matching.
pub fn ready_match_guard(service: &SplitService) -> bool {
    let ready = service.is_sdk_ready();
    if !ready {
        event!(Level::WARN, "SDK not ready, blocking route match");
    }
    ready
}

/// Allows access when a flag evaluates to the expected treatment.
#[derive(Clone)]
pub struct TreatmentGuard {
    feature_flag_name: String,
    expected_treatment: String,
    attributes: Option<AttributesFn>,
}

impl TreatmentGuard {
    /// Expects the `on` treatment.
    pub fn new(feature_flag_name: impl Into<String>) -> Self {
        Self {
            feature_flag_name: feature_flag_name.into(),
            expected_treatment: "on".to_string(),
            attributes: None,
        }
    }

    pub fn expecting(mut self, treatment: impl Into<String>) -> Self {
        self.expected_treatment = treatment.into();
        self
    }

    /// Attributes computed on every check.
    pub fn with_attributes<F>(mut self, attributes: F) -> Self
    where
        F: Fn() -> Attributes + Send + Sync + 'static,
    {
        self.attributes = Some(Arc::new(attributes));
        self
    }

    pub fn can_activate(&self, service: &SplitService) -> bool {
        if !service.is_sdk_ready() {
            event!(
                Level::WARN,
                flag = %self.feature_flag_name,
                "SDK not ready, cannot evaluate treatment for {}",
                self.feature_flag_name
            );
            return false;
        }
        self.matches(service)
    }

    fn matches(&self, service: &SplitService) -> bool {
        let mut args = vec![Value::String(self.feature_flag_name.clone())];
        if let Some(attributes) = &self.attributes {
            args.push(Value::Object(attributes()));
        }
        let treatment = service.get_treatment(&args);
        let allowed = treatment == self.expected_treatment;
        if !allowed {
            event!(
                Level::INFO,
                flag = %self.feature_flag_name,
                "treatment '{}' does not match expected '{}' for {}",
                treatment,
                self.expected_treatment,
                self.feature_flag_name
            );
        }
        allowed
    }
}

/// Allows access when every check passes. Stops at the first mismatch.
#[derive(Clone)]
pub struct MultiTreatmentGuard {
    checks: Vec<TreatmentGuard>,
}

impl MultiTreatmentGuard {
    pub fn new(checks: Vec<TreatmentGuard>) -> Self {
        Self { checks }
    }

    pub fn can_activate(&self, service: &SplitService) -> bool {
        if !service.is_sdk_ready() {
            event!(Level::WARN, "SDK not ready, cannot evaluate treatments");
            return false;
        }
        self.checks.iter().all(|check| check.matches(service))
    }
}

/// Readiness guard kept for older routing setups.
#[deprecated(note = "use `ready_guard` instead")]
pub struct SplitioGuard<'a> {
    service: &'a SplitService,
}

#[allow(deprecated)]
impl<'a> SplitioGuard<'a> {
    pub fn new(service: &'a SplitService) -> Self {
        Self { service }
    }

    pub fn can_activate(&self) -> bool {
        deprecated("SplitioGuard::can_activate", "ready_guard", || {
            self.service.is_sdk_ready()
        })
    }

    pub fn can_load(&self) -> bool {
        deprecated("SplitioGuard::can_load", "ready_guard", || {
            self.service.is_sdk_ready()
        })
    }

    pub fn can_activate_child(&self) -> bool {
        deprecated("SplitioGuard::can_activate_child", "ready_guard", || {
            self.service.is_sdk_ready()
        })
    }
}
