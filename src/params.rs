//! Resolution of the overloaded call shapes accepted by the evaluation methods.
//!
//! Every method takes its arguments as a slice of JSON values. Whether the
//! first argument is a key or a flag name is decided by the shape of the
//! second one (or of the third for `track`).

use serde_json::Value;

use crate::{
    error::SplitError,
    models::{Attributes, EvaluationOptions, Properties, SplitKey},
};

/// One flag (or flag set) name, or a list of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagNames {
    Single(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreatmentParams {
    /// `None` means the main key.
    pub key: Option<SplitKey>,
    pub names: FlagNames,
    pub attributes: Option<Attributes>,
    pub options: Option<EvaluationOptions>,
}

impl TreatmentParams {
    pub fn single_name(&self) -> Result<&str, SplitError> {
        match &self.names {
            FlagNames::Single(name) => Ok(name),
            FlagNames::List(_) => Err(SplitError::InvalidArguments(
                "expected a single name, got a list".to_string(),
            )),
        }
    }

    pub fn name_list(&self) -> Result<&[String], SplitError> {
        match &self.names {
            FlagNames::List(names) => Ok(names),
            FlagNames::Single(_) => Err(SplitError::InvalidArguments(
                "expected a list of names, got a single name".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackParams {
    /// `None` means the main key.
    pub key: Option<SplitKey>,
    pub traffic_type: String,
    pub event_type: String,
    pub value: Option<f64>,
    pub properties: Option<Properties>,
}

/// Normalized lookup string for a key.
pub fn build_instance(key: &SplitKey) -> String {
    key.instance_key()
}

pub fn is_string(v: Option<&Value>) -> bool {
    matches!(v, Some(Value::String(_)))
}

fn is_names(v: Option<&Value>) -> bool {
    matches!(v, Some(Value::String(_)) | Some(Value::Array(_)))
}

/// `(key, names, attributes?, options?)` when the second argument is a string
/// or an array, otherwise `(names, attributes?, options?)`.
pub fn parse_treatment_params(args: &[Value]) -> Result<TreatmentParams, SplitError> {
    parse_names_params(args, "feature flag name")
}

/// Same rule as [`parse_treatment_params`], with flag set names.
pub fn parse_flag_set_params(args: &[Value]) -> Result<TreatmentParams, SplitError> {
    parse_names_params(args, "flag set name")
}

fn parse_names_params(args: &[Value], what: &str) -> Result<TreatmentParams, SplitError> {
    if args.is_empty() {
        return Err(SplitError::InvalidArguments(format!("missing {}", what)));
    }
    if is_names(args.get(1)) {
        Ok(TreatmentParams {
            key: Some(SplitKey::from_value(&args[0])?),
            names: get_names(&args[1])?,
            attributes: get_object(args.get(2), "attributes")?,
            options: get_options(args.get(3))?,
        })
    } else {
        Ok(TreatmentParams {
            key: None,
            names: get_names(&args[0])?,
            attributes: get_object(args.get(1), "attributes")?,
            options: get_options(args.get(2))?,
        })
    }
}

/// `(key, trafficType, eventType, value?, properties?)` when the third
/// argument is a string, otherwise `(trafficType, eventType, value?, properties?)`.
pub fn parse_track_params(args: &[Value]) -> Result<TrackParams, SplitError> {
    if args.len() < 2 {
        return Err(SplitError::InvalidArguments(
            "track needs a traffic type and an event type".to_string(),
        ));
    }
    if is_string(args.get(2)) {
        Ok(TrackParams {
            key: Some(SplitKey::from_value(&args[0])?),
            traffic_type: get_str(&args[1], "traffic type")?,
            event_type: get_str(&args[2], "event type")?,
            value: get_number(args.get(3))?,
            properties: get_object(args.get(4), "properties")?,
        })
    } else {
        Ok(TrackParams {
            key: None,
            traffic_type: get_str(&args[0], "traffic type")?,
            event_type: get_str(&args[1], "event type")?,
            value: get_number(args.get(2))?,
            properties: get_object(args.get(3), "properties")?,
        })
    }
}

fn get_names(v: &Value) -> Result<FlagNames, SplitError> {
    match v {
        Value::String(s) => Ok(FlagNames::Single(s.clone())),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(SplitError::InvalidArguments(format!(
                    "{} is not a valid name",
                    other
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(FlagNames::List),
        other => Err(SplitError::InvalidArguments(format!(
            "{} is not a valid name",
            other
        ))),
    }
}

fn get_str(v: &Value, what: &str) -> Result<String, SplitError> {
    match v {
        Value::String(s) => Ok(s.clone()),
        other => Err(SplitError::InvalidArguments(format!(
            "{} is not a valid {}",
            other, what
        ))),
    }
}

fn get_number(v: Option<&Value>) -> Result<Option<f64>, SplitError> {
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(other) => Err(SplitError::InvalidArguments(format!(
            "value must be a number, got {}",
            other
        ))),
    }
}

fn get_object(v: Option<&Value>, what: &str) -> Result<Option<Attributes>, SplitError> {
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(other) => Err(SplitError::InvalidArguments(format!(
            "{} must be an object, got {}",
            what, other
        ))),
    }
}

fn get_options(v: Option<&Value>) -> Result<Option<EvaluationOptions>, SplitError> {
    match get_object(v, "evaluation options")? {
        None => Ok(None),
        Some(map) => serde_json::from_value(Value::Object(map))
            .map(Some)
            .map_err(|e| SplitError::InvalidArguments(format!("evaluation options: {}", e))),
    }
}
