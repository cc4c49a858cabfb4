use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::error::SplitError;

/// Treatment returned when a flag cannot be evaluated.
pub const CONTROL: &str = "control";

pub type Treatment = String;
pub type Treatments = HashMap<String, Treatment>;
pub type TreatmentsWithConfig = HashMap<String, TreatmentWithConfig>;

/// Attributes used when evaluating a flag for a key.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Properties attached to a tracked event.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Identity used to evaluate flags.
///
/// A compound key evaluates on `matching_key` while bucketing traffic on
/// `bucketing_key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged, try_from = "serde_json::Value")]
pub enum SplitKey {
    Bare(String),
    Compound {
        #[serde(rename = "matchingKey")]
        matching_key: String,
        #[serde(rename = "bucketingKey")]
        bucketing_key: String,
    },
}

impl SplitKey {
    pub fn compound(matching_key: impl Into<String>, bucketing_key: impl Into<String>) -> Self {
        SplitKey::Compound {
            matching_key: matching_key.into(),
            bucketing_key: bucketing_key.into(),
        }
    }

    /// The string this key is registered under.
    pub fn instance_key(&self) -> String {
        match self {
            SplitKey::Bare(key) => key.clone(),
            SplitKey::Compound {
                matching_key,
                bucketing_key,
            } => format!("{}-{}-", matching_key, bucketing_key),
        }
    }

    /// Reads a key from a dynamic argument.
    ///
    /// Strings and numbers are bare keys. Objects are compound keys where a
    /// missing `matchingKey` or `bucketingKey` is filled from the other one.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, SplitError> {
        match value {
            serde_json::Value::String(s) => Ok(SplitKey::Bare(s.clone())),
            serde_json::Value::Number(n) => Ok(SplitKey::Bare(n.to_string())),
            serde_json::Value::Object(map) => {
                let matching = map.get("matchingKey").and_then(key_part);
                let bucketing = map.get("bucketingKey").and_then(key_part);
                match (matching, bucketing) {
                    (Some(m), Some(b)) => Ok(SplitKey::compound(m, b)),
                    (Some(m), None) => Ok(SplitKey::compound(m.clone(), m)),
                    (None, Some(b)) => Ok(SplitKey::compound(b.clone(), b)),
                    (None, None) => Err(SplitError::InvalidArguments(
                        "compound key needs a matchingKey or a bucketingKey".to_string(),
                    )),
                }
            }
            other => Err(SplitError::InvalidArguments(format!(
                "{} is not a valid key",
                other
            ))),
        }
    }
}

fn key_part(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl TryFrom<serde_json::Value> for SplitKey {
    type Error = SplitError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        SplitKey::from_value(&value)
    }
}

impl fmt::Display for SplitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.instance_key())
    }
}

impl From<&str> for SplitKey {
    fn from(key: &str) -> Self {
        SplitKey::Bare(key.to_string())
    }
}

impl From<String> for SplitKey {
    fn from(key: String) -> Self {
        SplitKey::Bare(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TreatmentWithConfig {
    pub treatment: Treatment,
    pub config: Option<String>,
}

impl TreatmentWithConfig {
    pub fn control() -> Self {
        Self {
            treatment: CONTROL.to_string(),
            config: None,
        }
    }
}

/// Options forwarded untouched to the SDK on every evaluation.
#[skip_serializing_none]
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationOptions {
    pub properties: Option<Properties>,
}

/// Manager view of a feature flag.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitView {
    pub name: String,
    pub traffic_type: String,
    pub killed: bool,
    pub treatments: Vec<String>,
    pub change_number: i64,
    pub configs: HashMap<String, Option<String>>,
    #[serde(default)]
    pub sets: Vec<String>,
    pub default_treatment: String,
    #[serde(default)]
    pub impressions_disabled: bool,
}
