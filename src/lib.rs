//! Reactive wrapper around the Split.io feature flag SDK
//!
//! [`SplitService`] owns the SDK instance, keeps one shared client per key,
//! exposes client lifecycle events as async streams and main client status
//! as signals, and answers evaluations with the control treatment whenever
//! the SDK or a client is missing.
//!
//! The SDK itself is plugged in through the traits of [`sdk`]. The
//! [`localhost`] module provides an in-memory implementation.
//!
//! To change the default ready timeout set the SPLITIO_READY_TIMEOUT_MS
//! environment variable to the desired timeout value.
mod emitter;
mod events;
mod params;
mod registry;
mod service;
mod status;

pub mod config;
pub mod control;
pub mod deprecation;
pub mod error;
pub mod guards;
pub mod localhost;
pub mod models;
pub mod sdk;

pub use crate::emitter::EventEmitter;
pub use crate::error::SplitError;
pub use crate::events::EventStream;
pub use crate::params::{
    build_instance, is_string, parse_flag_set_params, parse_track_params, parse_treatment_params,
    FlagNames, TrackParams, TreatmentParams,
};
pub use crate::service::{SplitService, VERSION};
pub use crate::status::Signal;
