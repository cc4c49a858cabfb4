use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{error::SplitError, models::SplitKey};

/// The environment variable to change the default ready timeout.
pub const SPLITIO_READY_TIMEOUT_MS: &str = "SPLITIO_READY_TIMEOUT_MS";

const DEFAULT_READY_TIMEOUT_MS: u64 = 10_000;

/// Settings handed to the SDK factory, plus the options of the service itself.
///
/// Deserializes from the SDK's JSON settings shape:
///
/// ```json
/// { "core": { "authorizationKey": "localhost", "key": "user-1" },
///   "features": { "new_checkout": "on" },
///   "debug": true }
/// ```
#[skip_serializing_none]
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitConfig {
    pub core: CoreSettings,
    #[serde(default)]
    pub startup: StartupSettings,
    pub scheduler: Option<SchedulerSettings>,
    pub urls: Option<UrlSettings>,
    /// Treatments served in localhost mode.
    #[serde(default)]
    pub features: HashMap<String, LocalhostFeature>,
    /// Initialize as soon as the service is provided.
    #[serde(default = "default_auto_init")]
    pub auto_init: bool,
    /// Emit lifecycle debug logs.
    #[serde(default)]
    pub debug: bool,
    #[serde(skip)]
    pub error_handler: Option<ErrorHandler>,
}

fn default_auto_init() -> bool {
    true
}

impl SplitConfig {
    pub fn new(authorization_key: impl Into<String>, key: impl Into<SplitKey>) -> Self {
        Self {
            core: CoreSettings {
                authorization_key: authorization_key.into(),
                key: key.into(),
            },
            startup: StartupSettings::default(),
            scheduler: None,
            urls: None,
            features: HashMap::new(),
            auto_init: true,
            debug: false,
            error_handler: None,
        }
    }

    pub fn with_feature(mut self, name: impl Into<String>, feature: LocalhostFeature) -> Self {
        self.features.insert(name.into(), feature);
        self
    }

    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&SplitError) + Send + Sync + 'static,
    {
        self.error_handler = Some(ErrorHandler(Arc::new(handler)));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreSettings {
    pub authorization_key: String,
    pub key: SplitKey,
}

#[skip_serializing_none]
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupSettings {
    /// Seconds to wait before emitting the ready-timed-out event. Zero
    /// disables the timeout.
    pub ready_timeout: Option<f64>,
}

impl StartupSettings {
    /// The configured ready timeout, falling back to `SPLITIO_READY_TIMEOUT_MS`
    /// and then to 10 seconds.
    pub fn ready_timeout(&self) -> Duration {
        if let Some(secs) = self.ready_timeout.filter(|s| s.is_finite() && *s >= 0.0) {
            return Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        }
        let millis = std::env::var(SPLITIO_READY_TIMEOUT_MS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_READY_TIMEOUT_MS);
        Duration::from_millis(millis)
    }
}

#[skip_serializing_none]
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSettings {
    pub features_refresh_rate: Option<f64>,
    pub segments_refresh_rate: Option<f64>,
    pub impressions_refresh_rate: Option<f64>,
    pub events_push_rate: Option<f64>,
    pub offline_refresh_rate: Option<f64>,
}

#[skip_serializing_none]
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlSettings {
    pub sdk: Option<String>,
    pub events: Option<String>,
    pub auth: Option<String>,
    pub streaming: Option<String>,
}

/// A localhost-mode flag: either a bare treatment or a treatment with config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LocalhostFeature {
    Treatment(String),
    WithConfig {
        treatment: String,
        config: Option<String>,
        #[serde(default)]
        sets: Vec<String>,
    },
}

impl LocalhostFeature {
    pub fn treatment(&self) -> &str {
        match self {
            LocalhostFeature::Treatment(t) => t,
            LocalhostFeature::WithConfig { treatment, .. } => treatment,
        }
    }

    pub fn config(&self) -> Option<&str> {
        match self {
            LocalhostFeature::Treatment(_) => None,
            LocalhostFeature::WithConfig { config, .. } => config.as_deref(),
        }
    }

    pub fn sets(&self) -> &[String] {
        match self {
            LocalhostFeature::Treatment(_) => &[],
            LocalhostFeature::WithConfig { sets, .. } => sets,
        }
    }
}

impl From<&str> for LocalhostFeature {
    fn from(treatment: &str) -> Self {
        LocalhostFeature::Treatment(treatment.to_string())
    }
}

/// Callback receiving errors raised while the service initializes itself.
#[derive(Clone)]
pub struct ErrorHandler(Arc<dyn Fn(&SplitError) + Send + Sync>);

impl ErrorHandler {
    pub fn handle(&self, err: &SplitError) {
        (self.0)(err)
    }
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorHandler")
    }
}
