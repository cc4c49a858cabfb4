#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tokio::sync::watch;

use splitio_reactive::{
    config::SplitConfig,
    models::{
        Attributes, EvaluationOptions, Properties, SplitKey, SplitView, Treatment,
        TreatmentWithConfig, Treatments, TreatmentsWithConfig,
    },
    sdk::{
        EventNames, Listener, OnceListener, SdkEvent, SplitClient, SplitFactory, SplitManager,
        SplitSdk,
    },
    EventEmitter, SplitService,
};

pub const MOCK_EVENTS: EventNames = EventNames {
    ready: "mock::ready",
    ready_from_cache: "mock::ready_from_cache",
    ready_timed_out: "mock::ready_timed_out",
    update: "mock::update",
};

pub type TrackCall = (String, String, Option<f64>, Option<Properties>);

/// Client that records every call and only emits events when told to.
pub struct MockClient {
    pub key: SplitKey,
    emitter: EventEmitter,
    calls: Mutex<Vec<String>>,
    tracked: Mutex<Vec<TrackCall>>,
    ready: watch::Sender<bool>,
    pub destroyed: AtomicBool,
    pub fail_destroy: AtomicBool,
}

impl MockClient {
    fn new(key: SplitKey) -> Arc<Self> {
        let (ready, _) = watch::channel(false);
        Arc::new(Self {
            key,
            emitter: EventEmitter::new(),
            calls: Mutex::new(vec![]),
            tracked: Mutex::new(vec![]),
            ready,
            destroyed: AtomicBool::new(false),
            fail_destroy: AtomicBool::new(false),
        })
    }

    /// Fires `ev` like the SDK would. Returns how many listeners ran.
    pub fn emit(&self, ev: SdkEvent) -> usize {
        if ev == SdkEvent::Ready {
            self.ready.send_replace(true);
        }
        self.emitter.emit(MOCK_EVENTS.name(ev))
    }

    pub fn listener_count(&self, ev: SdkEvent) -> usize {
        self.emitter.listener_count(MOCK_EVENTS.name(ev))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }

    pub fn tracked(&self) -> Vec<TrackCall> {
        self.tracked.lock().expect("lock").clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("lock").push(call);
    }
}

#[async_trait]
impl SplitClient for MockClient {
    fn events(&self) -> &EventNames {
        &MOCK_EVENTS
    }

    fn on(&self, event: &str, listener: Listener) {
        self.emitter.on(event, listener);
    }

    fn once(&self, event: &str, listener: OnceListener) {
        self.emitter.once(event, listener);
    }

    async fn ready(&self) -> Result<()> {
        let mut rx = self.ready.subscribe();
        rx.wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| anyhow!("mock client dropped"))
    }

    async fn destroy(&self) -> Result<()> {
        self.destroyed.store(true, Ordering::SeqCst);
        self.record("destroy".to_string());
        if self.fail_destroy.load(Ordering::SeqCst) {
            bail!("mock destroy failure");
        }
        Ok(())
    }

    fn get_treatment(
        &self,
        feature_flag_name: &str,
        attributes: Option<&Attributes>,
        options: Option<&EvaluationOptions>,
    ) -> Treatment {
        self.record(format!(
            "get_treatment:{}:{}:{}",
            feature_flag_name,
            attributes.is_some(),
            options.is_some()
        ));
        "on".to_string()
    }

    fn get_treatment_with_config(
        &self,
        feature_flag_name: &str,
        _attributes: Option<&Attributes>,
        _options: Option<&EvaluationOptions>,
    ) -> TreatmentWithConfig {
        self.record(format!("get_treatment_with_config:{}", feature_flag_name));
        TreatmentWithConfig {
            treatment: "on".to_string(),
            config: Some("{}".to_string()),
        }
    }

    fn get_treatments(
        &self,
        feature_flag_names: &[String],
        _attributes: Option<&Attributes>,
        _options: Option<&EvaluationOptions>,
    ) -> Treatments {
        self.record(format!("get_treatments:{}", feature_flag_names.join(",")));
        feature_flag_names
            .iter()
            .map(|name| (name.clone(), "on".to_string()))
            .collect()
    }

    fn get_treatments_with_config(
        &self,
        feature_flag_names: &[String],
        _attributes: Option<&Attributes>,
        _options: Option<&EvaluationOptions>,
    ) -> TreatmentsWithConfig {
        self.record(format!(
            "get_treatments_with_config:{}",
            feature_flag_names.join(",")
        ));
        feature_flag_names
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    TreatmentWithConfig {
                        treatment: "on".to_string(),
                        config: None,
                    },
                )
            })
            .collect()
    }

    fn get_treatments_by_flag_set(
        &self,
        flag_set: &str,
        _attributes: Option<&Attributes>,
        _options: Option<&EvaluationOptions>,
    ) -> Treatments {
        self.record(format!("get_treatments_by_flag_set:{}", flag_set));
        HashMap::from([(format!("{}_flag", flag_set), "on".to_string())])
    }

    fn get_treatments_with_config_by_flag_set(
        &self,
        flag_set: &str,
        _attributes: Option<&Attributes>,
        _options: Option<&EvaluationOptions>,
    ) -> TreatmentsWithConfig {
        self.record(format!(
            "get_treatments_with_config_by_flag_set:{}",
            flag_set
        ));
        HashMap::from([(
            format!("{}_flag", flag_set),
            TreatmentWithConfig {
                treatment: "on".to_string(),
                config: None,
            },
        )])
    }

    fn get_treatments_by_flag_sets(
        &self,
        flag_sets: &[String],
        _attributes: Option<&Attributes>,
        _options: Option<&EvaluationOptions>,
    ) -> Treatments {
        self.record(format!("get_treatments_by_flag_sets:{}", flag_sets.join(",")));
        flag_sets
            .iter()
            .map(|set| (format!("{}_flag", set), "on".to_string()))
            .collect()
    }

    fn get_treatments_with_config_by_flag_sets(
        &self,
        flag_sets: &[String],
        _attributes: Option<&Attributes>,
        _options: Option<&EvaluationOptions>,
    ) -> TreatmentsWithConfig {
        self.record(format!(
            "get_treatments_with_config_by_flag_sets:{}",
            flag_sets.join(",")
        ));
        flag_sets
            .iter()
            .map(|set| {
                (
                    format!("{}_flag", set),
                    TreatmentWithConfig {
                        treatment: "on".to_string(),
                        config: None,
                    },
                )
            })
            .collect()
    }

    fn track(
        &self,
        traffic_type: &str,
        event_type: &str,
        value: Option<f64>,
        properties: Option<&Properties>,
    ) -> bool {
        self.record(format!("track:{}:{}", traffic_type, event_type));
        self.tracked.lock().expect("lock").push((
            traffic_type.to_string(),
            event_type.to_string(),
            value,
            properties.cloned(),
        ));
        true
    }
}

pub struct MockManager;

impl SplitManager for MockManager {
    fn splits(&self) -> Vec<SplitView> {
        vec![SplitView {
            name: "flag1".to_string(),
            traffic_type: "user".to_string(),
            killed: false,
            treatments: vec!["on".to_string(), "off".to_string()],
            change_number: 1,
            configs: HashMap::new(),
            sets: vec![],
            default_treatment: "off".to_string(),
            impressions_disabled: false,
        }]
    }

    fn split(&self, feature_flag_name: &str) -> Option<SplitView> {
        self.splits()
            .into_iter()
            .find(|s| s.name == feature_flag_name)
    }

    fn names(&self) -> Vec<String> {
        vec!["flag1".to_string()]
    }
}

pub struct MockSdk {
    pub version: String,
    main_key: SplitKey,
    clients: Mutex<HashMap<String, Arc<MockClient>>>,
}

impl MockSdk {
    /// The mock behind the client registered for `instance_key`.
    pub fn mock_client(&self, instance_key: &str) -> Arc<MockClient> {
        self.clients
            .lock()
            .expect("lock")
            .get(instance_key)
            .cloned()
            .expect("client should exist")
    }

    pub fn main(&self) -> Arc<MockClient> {
        self.mock_client(&self.main_key.instance_key())
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().expect("lock").len()
    }
}

impl SplitSdk for MockSdk {
    fn client(&self, key: Option<&SplitKey>) -> Arc<dyn SplitClient> {
        let key = key.unwrap_or(&self.main_key).clone();
        let client = self
            .clients
            .lock()
            .expect("lock")
            .entry(key.instance_key())
            .or_insert_with(|| MockClient::new(key))
            .clone();
        client
    }

    fn manager(&self) -> Arc<dyn SplitManager> {
        Arc::new(MockManager)
    }
}

#[derive(Default)]
pub struct MockFactory {
    pub created: AtomicUsize,
    pub fail: AtomicBool,
    sdk: Mutex<Option<Arc<MockSdk>>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sdk(&self) -> Arc<MockSdk> {
        self.sdk
            .lock()
            .expect("lock")
            .clone()
            .expect("sdk should be created")
    }
}

impl SplitFactory for MockFactory {
    fn create(&self, config: &SplitConfig, version: &str) -> Result<Arc<dyn SplitSdk>> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("invalid sdk key");
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        let sdk = Arc::new(MockSdk {
            version: version.to_string(),
            main_key: config.core.key.clone(),
            clients: Mutex::new(HashMap::new()),
        });
        *self.sdk.lock().expect("lock") = Some(sdk.clone());
        Ok(sdk)
    }
}

pub fn config() -> SplitConfig {
    SplitConfig::new("sdk-key", "main-user")
}

/// Service already initialized against a fresh mock factory.
pub fn initialized_service() -> (Arc<MockFactory>, SplitService) {
    let factory = MockFactory::new();
    let service = SplitService::new(factory.clone());
    service
        .initialize(&config())
        .expect("should be able to initialize");
    (factory, service)
}
