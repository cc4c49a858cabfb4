use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use crossbeam::sync::ShardedLock;
use tokio::sync::watch;
use tracing::{event, Level};

use crate::{
    config::LocalhostFeature,
    emitter::EventEmitter,
    models::{
        Attributes, EvaluationOptions, Properties, SplitKey, Treatment, TreatmentWithConfig,
        Treatments, TreatmentsWithConfig, CONTROL,
    },
    sdk::{EventNames, Listener, OnceListener, SplitClient},
};

use super::TrackedEvent;

pub const LOCALHOST_EVENTS: EventNames = EventNames {
    ready: "init::ready",
    ready_from_cache: "init::cache-ready",
    ready_timed_out: "init::timeout",
    update: "state::update",
};

pub(crate) type Features = Arc<ShardedLock<HashMap<String, LocalhostFeature>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Pending,
    Ready,
    Destroyed,
}

/// Client of the in-memory SDK, bound to one key.
///
/// Listeners registered with `once` for a lifecycle event that already
/// happened run immediately.
pub struct LocalhostClient {
    key: SplitKey,
    features: Features,
    tracked: Arc<Mutex<Vec<TrackedEvent>>>,
    emitter: EventEmitter,
    fired: Mutex<HashSet<&'static str>>,
    readiness: watch::Sender<Readiness>,
    destroyed: AtomicBool,
}

impl LocalhostClient {
    pub(crate) fn new(
        key: SplitKey,
        features: Features,
        tracked: Arc<Mutex<Vec<TrackedEvent>>>,
    ) -> Arc<Self> {
        let (readiness, _) = watch::channel(Readiness::Pending);
        Arc::new(Self {
            key,
            features,
            tracked,
            emitter: EventEmitter::new(),
            fired: Mutex::new(HashSet::new()),
            readiness,
            destroyed: AtomicBool::new(false),
        })
    }

    /// A client with no flags that never becomes ready on its own.
    #[cfg(test)]
    pub(crate) fn detached(key: &str) -> Arc<Self> {
        Self::new(
            SplitKey::from(key),
            Arc::new(ShardedLock::new(HashMap::new())),
            Arc::new(Mutex::new(vec![])),
        )
    }

    #[cfg(test)]
    pub(crate) fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    pub fn key(&self) -> &SplitKey {
        &self.key
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_ready(&self) {
        if self.is_destroyed() {
            return;
        }
        // Listeners first, so anyone woken by `ready()` sees their effects.
        self.fire(LOCALHOST_EVENTS.ready);
        self.readiness.send_replace(Readiness::Ready);
    }

    /// Emits the timed-out event unless the client is already ready.
    pub(crate) fn mark_timed_out(&self) {
        if self.is_destroyed() {
            return;
        }
        let first = {
            let mut fired = self
                .fired
                .lock()
                .expect("should always be able to acquire lock");
            !fired.contains(LOCALHOST_EVENTS.ready) && fired.insert(LOCALHOST_EVENTS.ready_timed_out)
        };
        if first {
            event!(Level::DEBUG, key = %self.key, "localhost client timed out");
            self.emitter.emit(LOCALHOST_EVENTS.ready_timed_out);
        }
    }

    pub(crate) fn notify_update(&self) {
        if self.is_destroyed() || *self.readiness.borrow() != Readiness::Ready {
            return;
        }
        self.emitter.emit(LOCALHOST_EVENTS.update);
    }

    fn fire(&self, event_name: &'static str) {
        let first = self
            .fired
            .lock()
            .expect("should always be able to acquire lock")
            .insert(event_name);
        if first {
            self.emitter.emit(event_name);
        }
    }

    fn lookup(&self, name: &str) -> Option<LocalhostFeature> {
        if self.is_destroyed() {
            return None;
        }
        self.features
            .read()
            .expect("should always be able to acquire read lock")
            .get(name)
            .cloned()
    }

    fn flag_set_members(&self, flag_sets: &[String]) -> Vec<String> {
        if self.is_destroyed() {
            return vec![];
        }
        let features = self
            .features
            .read()
            .expect("should always be able to acquire read lock");
        let mut names: Vec<String> = features
            .iter()
            .filter(|(_, f)| f.sets().iter().any(|s| flag_sets.contains(s)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl SplitClient for LocalhostClient {
    fn events(&self) -> &EventNames {
        &LOCALHOST_EVENTS
    }

    fn on(&self, event_name: &str, listener: Listener) {
        self.emitter.on(event_name, listener);
    }

    fn once(&self, event_name: &str, listener: OnceListener) {
        let fired = self
            .fired
            .lock()
            .expect("should always be able to acquire lock");
        if fired.contains(event_name) {
            drop(fired);
            listener();
            return;
        }
        self.emitter.once(event_name, listener);
    }

    async fn ready(&self) -> Result<()> {
        let mut rx = self.readiness.subscribe();
        let state = rx
            .wait_for(|r| *r != Readiness::Pending)
            .await
            .map(|r| *r)
            .map_err(|_| anyhow!("client dropped before becoming ready"))?;
        match state {
            Readiness::Ready => Ok(()),
            _ => Err(anyhow!("client for key {} was destroyed", self.key)),
        }
    }

    async fn destroy(&self) -> Result<()> {
        self.destroyed.store(true, Ordering::SeqCst);
        self.readiness.send_replace(Readiness::Destroyed);
        self.emitter.clear();
        event!(Level::DEBUG, key = %self.key, "localhost client destroyed");
        Ok(())
    }

    fn get_treatment(
        &self,
        feature_flag_name: &str,
        _attributes: Option<&Attributes>,
        _options: Option<&EvaluationOptions>,
    ) -> Treatment {
        self.lookup(feature_flag_name)
            .map(|f| f.treatment().to_string())
            .unwrap_or_else(|| CONTROL.to_string())
    }

    fn get_treatment_with_config(
        &self,
        feature_flag_name: &str,
        _attributes: Option<&Attributes>,
        _options: Option<&EvaluationOptions>,
    ) -> TreatmentWithConfig {
        match self.lookup(feature_flag_name) {
            Some(f) => TreatmentWithConfig {
                treatment: f.treatment().to_string(),
                config: f.config().map(str::to_string),
            },
            None => TreatmentWithConfig::control(),
        }
    }

    fn get_treatments(
        &self,
        feature_flag_names: &[String],
        attributes: Option<&Attributes>,
        options: Option<&EvaluationOptions>,
    ) -> Treatments {
        feature_flag_names
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    self.get_treatment(name, attributes, options),
                )
            })
            .collect()
    }

    fn get_treatments_with_config(
        &self,
        feature_flag_names: &[String],
        attributes: Option<&Attributes>,
        options: Option<&EvaluationOptions>,
    ) -> TreatmentsWithConfig {
        feature_flag_names
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    self.get_treatment_with_config(name, attributes, options),
                )
            })
            .collect()
    }

    fn get_treatments_by_flag_set(
        &self,
        flag_set: &str,
        attributes: Option<&Attributes>,
        options: Option<&EvaluationOptions>,
    ) -> Treatments {
        self.get_treatments_by_flag_sets(&[flag_set.to_string()], attributes, options)
    }

    fn get_treatments_with_config_by_flag_set(
        &self,
        flag_set: &str,
        attributes: Option<&Attributes>,
        options: Option<&EvaluationOptions>,
    ) -> TreatmentsWithConfig {
        self.get_treatments_with_config_by_flag_sets(&[flag_set.to_string()], attributes, options)
    }

    fn get_treatments_by_flag_sets(
        &self,
        flag_sets: &[String],
        attributes: Option<&Attributes>,
        options: Option<&EvaluationOptions>,
    ) -> Treatments {
        self.get_treatments(&self.flag_set_members(flag_sets), attributes, options)
    }

    fn get_treatments_with_config_by_flag_sets(
        &self,
        flag_sets: &[String],
        attributes: Option<&Attributes>,
        options: Option<&EvaluationOptions>,
    ) -> TreatmentsWithConfig {
        self.get_treatments_with_config(&self.flag_set_members(flag_sets), attributes, options)
    }

    fn track(
        &self,
        traffic_type: &str,
        event_type: &str,
        value: Option<f64>,
        properties: Option<&Properties>,
    ) -> bool {
        if self.is_destroyed() || traffic_type.is_empty() || event_type.is_empty() {
            return false;
        }
        self.tracked
            .lock()
            .expect("should always be able to acquire lock")
            .push(TrackedEvent {
                key: self.key.clone(),
                traffic_type: traffic_type.to_string(),
                event_type: event_type.to_string(),
                value,
                properties: properties.cloned(),
                timestamp: Utc::now(),
            });
        true
    }
}
