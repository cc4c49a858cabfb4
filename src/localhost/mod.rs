//! In-memory SDK serving treatments from [`SplitConfig::features`].
//!
//! Selected with the `localhost` authorization key. Clients become ready on
//! the next scheduler tick after they are requested, or after the delay set
//! with [`LocalhostFactory::with_ready_delay`]. A client still pending after
//! `startup.readyTimeout` emits the timed-out event and may become ready later.
//! Changes pushed with [`LocalhostSdk::set_features`] are announced with the
//! update event, and tracked events are kept in memory.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use crossbeam::sync::ShardedLock;
use serde::Serialize;
use serde_with::skip_serializing_none;
use tokio::runtime::Handle;
use tracing::{event, Level};

use crate::{
    config::{LocalhostFeature, SplitConfig},
    models::{Properties, SplitKey},
    sdk::{SplitClient, SplitFactory, SplitManager, SplitSdk},
};

use self::{client::Features, manager::LocalhostManager};

mod client;
mod manager;

pub use self::client::{LocalhostClient, LOCALHOST_EVENTS};

/// Authorization key selecting the in-memory SDK.
pub const LOCALHOST_MODE: &str = "localhost";

/// An event recorded by [`SplitClient::track`].
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEvent {
    pub key: SplitKey,
    pub traffic_type: String,
    pub event_type: String,
    pub value: Option<f64>,
    pub properties: Option<Properties>,
    pub timestamp: DateTime<Utc>,
}

pub struct LocalhostSdk {
    version: String,
    main_key: SplitKey,
    features: Features,
    tracked: Arc<Mutex<Vec<TrackedEvent>>>,
    clients: Mutex<HashMap<String, Arc<LocalhostClient>>>,
    ready_delay: Duration,
    ready_timeout: Duration,
    runtime: Handle,
}

impl LocalhostSdk {
    fn new(config: &SplitConfig, version: &str, ready_delay: Duration, runtime: Handle) -> Self {
        Self {
            version: version.to_string(),
            main_key: config.core.key.clone(),
            features: Arc::new(ShardedLock::new(config.features.clone())),
            tracked: Arc::new(Mutex::new(vec![])),
            clients: Mutex::new(HashMap::new()),
            ready_delay,
            ready_timeout: config.startup.ready_timeout(),
            runtime,
        }
    }

    /// Version string of the wrapper that created this SDK.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Replaces every flag and emits the update event on every ready client.
    pub fn set_features(&self, features: HashMap<String, LocalhostFeature>) {
        *self
            .features
            .write()
            .expect("should always be able to acquire write lock") = features;
        self.notify_update();
    }

    pub fn set_feature(&self, name: impl Into<String>, feature: LocalhostFeature) {
        self.features
            .write()
            .expect("should always be able to acquire write lock")
            .insert(name.into(), feature);
        self.notify_update();
    }

    fn notify_update(&self) {
        let clients: Vec<Arc<LocalhostClient>> = self
            .clients
            .lock()
            .expect("should always be able to acquire lock")
            .values()
            .cloned()
            .collect();
        event!(Level::DEBUG, clients = clients.len(), "localhost flags changed");
        for client in clients {
            client.notify_update();
        }
    }

    pub fn tracked_events(&self) -> Vec<TrackedEvent> {
        self.tracked
            .lock()
            .expect("should always be able to acquire lock")
            .clone()
    }
}

impl SplitSdk for LocalhostSdk {
    fn client(&self, key: Option<&SplitKey>) -> Arc<dyn SplitClient> {
        let key = key.unwrap_or(&self.main_key).clone();
        let mut clients = self
            .clients
            .lock()
            .expect("should always be able to acquire lock");
        if let Some(client) = clients.get(&key.instance_key()) {
            return client.clone();
        }

        let client = LocalhostClient::new(key.clone(), self.features.clone(), self.tracked.clone());
        clients.insert(key.instance_key(), client.clone());

        let pending = client.clone();
        let delay = self.ready_delay;
        self.runtime.spawn(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            pending.mark_ready();
        });
        if !self.ready_timeout.is_zero() {
            let pending = client.clone();
            let timeout = self.ready_timeout;
            self.runtime.spawn(async move {
                tokio::time::sleep(timeout).await;
                pending.mark_timed_out();
            });
        }
        client
    }

    fn manager(&self) -> Arc<dyn SplitManager> {
        Arc::new(LocalhostManager::new(self.features.clone()))
    }
}

/// Factory for [`LocalhostSdk`]. Keeps a handle on the last SDK it created.
#[derive(Default)]
pub struct LocalhostFactory {
    last: Mutex<Option<Arc<LocalhostSdk>>>,
    ready_delay: Duration,
}

impl LocalhostFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays readiness of every client, like a slow first synchronization.
    /// Clients still time out after `startup.readyTimeout`.
    pub fn with_ready_delay(mut self, delay: Duration) -> Self {
        self.ready_delay = delay;
        self
    }

    pub fn sdk(&self) -> Option<Arc<LocalhostSdk>> {
        self.last
            .lock()
            .expect("should always be able to acquire lock")
            .clone()
    }
}

impl SplitFactory for LocalhostFactory {
    fn create(&self, config: &SplitConfig, version: &str) -> Result<Arc<dyn SplitSdk>> {
        if config.core.authorization_key != LOCALHOST_MODE {
            bail!(
                "the in-memory SDK only accepts the '{}' authorization key",
                LOCALHOST_MODE
            );
        }
        let runtime = Handle::try_current().context("localhost mode needs a Tokio runtime")?;
        let sdk = Arc::new(LocalhostSdk::new(config, version, self.ready_delay, runtime));
        *self
            .last
            .lock()
            .expect("should always be able to acquire lock") = Some(sdk.clone());
        event!(Level::DEBUG, version, "localhost SDK created");
        Ok(sdk)
    }
}
