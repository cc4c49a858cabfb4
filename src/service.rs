use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde_json::Value;
use tokio_stream::wrappers::WatchStream;
use tracing::{event, Level};

use crate::{
    config::SplitConfig,
    control::{ControlClient, DefaultManager},
    deprecation::deprecated,
    error::SplitError,
    events::{EventBridge, EventStream},
    models::{
        SplitKey, SplitView, Treatment, TreatmentWithConfig, Treatments, TreatmentsWithConfig,
        CONTROL,
    },
    params::{parse_flag_set_params, parse_track_params, parse_treatment_params, FlagNames},
    registry::ClientRegistry,
    sdk::{SdkEvent, SplitClient, SplitFactory, SplitManager, SplitSdk},
    status::{SdkStatus, Signal},
};

/// Identifies this wrapper to the SDK.
pub const VERSION: &str = concat!("reactive-rust-", env!("CARGO_PKG_VERSION"));

/// Façade over a feature flag SDK: one main client plus shared clients keyed
/// by user, lifecycle events as streams and evaluation with safe defaults.
///
/// Evaluation methods accept the arguments of the JavaScript SDK as JSON
/// values, with or without a leading key:
///
/// ```ignore
/// service.get_treatment(&[json!("new_checkout")]);
/// service.get_treatment(&[json!("user-2"), json!("new_checkout"), json!({ "plan": "pro" })]);
/// ```
///
/// Nothing here panics on bad input. Unknown keys, a missing SDK or malformed
/// arguments are logged and answered with the control treatment.
pub struct SplitService {
    factory: Arc<dyn SplitFactory>,
    registry: ClientRegistry,
    bridge: EventBridge,
    status: SdkStatus,
    control: Arc<dyn SplitClient>,
    default_manager: Arc<dyn SplitManager>,
    debug: AtomicBool,
}

impl SplitService {
    pub fn new(factory: Arc<dyn SplitFactory>) -> Self {
        Self {
            factory,
            registry: ClientRegistry::new(),
            bridge: EventBridge::new(),
            status: SdkStatus::new(),
            control: Arc::new(ControlClient),
            default_manager: Arc::new(DefaultManager),
            debug: AtomicBool::new(false),
        }
    }

    /// Builds the service and, unless `config.auto_init` is off, initializes
    /// it right away. Failures go to `config.error_handler` when set.
    pub fn provide(factory: Arc<dyn SplitFactory>, config: SplitConfig) -> Self {
        let service = Self::new(factory);
        if !config.auto_init {
            return service;
        }
        if let Err(err) = service.start(&config) {
            match &config.error_handler {
                Some(handler) => handler.handle(&err),
                None => event!(Level::ERROR, code = err.code(), "{}", err),
            }
        }
        service
    }

    /// Creates the SDK and its main client. The returned stream yields once
    /// the main client is ready.
    pub fn initialize(&self, config: &SplitConfig) -> Result<EventStream, SplitError> {
        self.start(config).map_err(|err| {
            event!(Level::ERROR, code = err.code(), "{}", err);
            err
        })
    }

    #[deprecated(note = "use `SplitService::provide` instead")]
    pub fn init(&self, config: &SplitConfig) -> Result<EventStream, SplitError> {
        deprecated("SplitService::init", "SplitService::provide", || {
            self.initialize(config)
        })
    }

    fn start(&self, config: &SplitConfig) -> Result<EventStream, SplitError> {
        let (main_instance, client) = self.registry.initialize(
            self.factory.as_ref(),
            config,
            VERSION,
            |instance, client| {
                self.bridge.attach(instance, client);
                self.status.attach(client, config.debug);
            },
        )?;
        self.debug.store(config.debug, Ordering::SeqCst);
        self.log_debug("SDK initialized");
        Ok(self
            .bridge
            .subscribe(&main_instance, client.events().ready, SdkEvent::Ready))
    }

    /// Registers a shared client for `key`. The returned stream yields once
    /// that client is ready, or carries the reason it could not be created.
    pub fn create_client(&self, key: &SplitKey) -> EventStream {
        let created = self
            .registry
            .create_client(key, |instance, client| self.bridge.attach(instance, client));
        match created {
            Ok((instance, client)) => {
                if self.debug.load(Ordering::SeqCst) {
                    event!(Level::DEBUG, key = %instance, "shared client created");
                }
                self.bridge
                    .subscribe(&instance, client.events().ready, SdkEvent::Ready)
            }
            Err(err @ SplitError::AlreadyExists(_)) => {
                event!(Level::WARN, code = err.code(), "{}", err);
                EventStream::failed(SdkEvent::Ready, err)
            }
            Err(err) => {
                event!(Level::ERROR, code = err.code(), "{}", err);
                EventStream::failed(SdkEvent::Ready, err)
            }
        }
    }

    pub fn sdk_ready(&self) -> EventStream {
        self.client_stream(None, SdkEvent::Ready)
    }

    pub fn sdk_ready_from_cache(&self) -> EventStream {
        self.client_stream(None, SdkEvent::ReadyFromCache)
    }

    pub fn sdk_ready_timed_out(&self) -> EventStream {
        self.client_stream(None, SdkEvent::ReadyTimedOut)
    }

    pub fn sdk_update(&self) -> EventStream {
        self.client_stream(None, SdkEvent::Update)
    }

    pub fn client_ready(&self, key: &SplitKey) -> EventStream {
        self.client_stream(Some(key), SdkEvent::Ready)
    }

    pub fn client_ready_from_cache(&self, key: &SplitKey) -> EventStream {
        self.client_stream(Some(key), SdkEvent::ReadyFromCache)
    }

    pub fn client_ready_timed_out(&self, key: &SplitKey) -> EventStream {
        self.client_stream(Some(key), SdkEvent::ReadyTimedOut)
    }

    pub fn client_update(&self, key: &SplitKey) -> EventStream {
        self.client_stream(Some(key), SdkEvent::Update)
    }

    fn client_stream(&self, key: Option<&SplitKey>, ev: SdkEvent) -> EventStream {
        match self.lookup(key) {
            Ok((instance, client)) => {
                self.bridge
                    .subscribe(&instance, client.events().name(ev), ev)
            }
            Err(err) => EventStream::failed(ev, err),
        }
    }

    /// Waits until the main client is ready. A timeout does not end the wait.
    pub async fn ready(&self) -> Result<(), SplitError> {
        let (_, client) = self.lookup(None)?;
        client.ready().await?;
        Ok(())
    }

    /// Waits until the shared client for `key` is ready.
    pub async fn ready_for(&self, key: &SplitKey) -> Result<(), SplitError> {
        let (_, client) = self.lookup(Some(key))?;
        client.ready().await?;
        Ok(())
    }

    /// Like [`SplitService::ready_for`], but a ready timeout ends the wait with
    /// [`SplitError::ClientTimedOut`].
    pub async fn ready_or_timeout(&self, key: &SplitKey) -> Result<(), SplitError> {
        let (instance, client) = self.lookup(Some(key))?;
        let names = *client.events();
        let mut ready = self
            .bridge
            .subscribe(&instance, names.ready, SdkEvent::Ready);
        let mut timed_out =
            self.bridge
                .subscribe(&instance, names.ready_timed_out, SdkEvent::ReadyTimedOut);

        tokio::select! {
            biased;
            res = ready.next() => match res {
                Some(Ok(_)) => Ok(()),
                Some(Err(err)) => Err(err),
                None => Err(SplitError::ClientNotInitialized(instance)),
            },
            res = timed_out.next() => match res {
                Some(Ok(_)) => {
                    let err = SplitError::ClientTimedOut(instance);
                    event!(Level::WARN, code = err.code(), "{}", err);
                    Err(err)
                }
                Some(Err(err)) => Err(err),
                None => Err(SplitError::ClientNotInitialized(instance)),
            },
        }
    }

    /// Whether the main client reported ready.
    pub fn is_sdk_ready(&self) -> bool {
        self.status.get(SdkEvent::Ready)
    }

    pub fn ready_signal(&self) -> Signal<bool> {
        self.status.signal(SdkEvent::Ready)
    }

    pub fn ready_from_cache_signal(&self) -> Signal<bool> {
        self.status.signal(SdkEvent::ReadyFromCache)
    }

    pub fn timed_out_signal(&self) -> Signal<bool> {
        self.status.signal(SdkEvent::ReadyTimedOut)
    }

    pub fn update_signal(&self) -> Signal<bool> {
        self.status.signal(SdkEvent::Update)
    }

    /// Current status of `ev` for the main client, then every change.
    pub fn status_stream(&self, ev: SdkEvent) -> WatchStream<bool> {
        self.status.signal(ev).into_stream()
    }

    /// The registered client for `key`, or the main client.
    pub fn sdk_client(&self, key: Option<&SplitKey>) -> Option<Arc<dyn SplitClient>> {
        match self.registry.lookup(key) {
            Ok((_, client)) => Some(client),
            Err(err @ SplitError::NotInitialized) => {
                event!(Level::ERROR, code = err.code(), "{}", err);
                None
            }
            Err(_) => None,
        }
    }

    pub fn sdk_factory(&self) -> Option<Arc<dyn SplitSdk>> {
        let sdk = self.registry.sdk();
        if sdk.is_none() {
            let err = SplitError::NotInitialized;
            event!(Level::ERROR, code = err.code(), "{}", err);
        }
        sdk
    }

    pub fn get_treatment(&self, args: &[Value]) -> Treatment {
        let parsed = parse_treatment_params(args)
            .and_then(|params| Ok((params.single_name()?.to_string(), params)));
        match checked("get_treatment", parsed) {
            Some((name, params)) => self.client_for(params.key.as_ref()).get_treatment(
                &name,
                params.attributes.as_ref(),
                params.options.as_ref(),
            ),
            None => CONTROL.to_string(),
        }
    }

    pub fn get_treatment_with_config(&self, args: &[Value]) -> TreatmentWithConfig {
        let parsed = parse_treatment_params(args)
            .and_then(|params| Ok((params.single_name()?.to_string(), params)));
        match checked("get_treatment_with_config", parsed) {
            Some((name, params)) => self
                .client_for(params.key.as_ref())
                .get_treatment_with_config(
                    &name,
                    params.attributes.as_ref(),
                    params.options.as_ref(),
                ),
            None => TreatmentWithConfig::control(),
        }
    }

    pub fn get_treatments(&self, args: &[Value]) -> Treatments {
        match checked("get_treatments", parse_treatment_params(args)) {
            Some(params) => self.client_for(params.key.as_ref()).get_treatments(
                &name_list(&params.names),
                params.attributes.as_ref(),
                params.options.as_ref(),
            ),
            None => Treatments::new(),
        }
    }

    pub fn get_treatments_with_config(&self, args: &[Value]) -> TreatmentsWithConfig {
        match checked("get_treatments_with_config", parse_treatment_params(args)) {
            Some(params) => self
                .client_for(params.key.as_ref())
                .get_treatments_with_config(
                    &name_list(&params.names),
                    params.attributes.as_ref(),
                    params.options.as_ref(),
                ),
            None => TreatmentsWithConfig::new(),
        }
    }

    pub fn get_treatments_by_flag_set(&self, args: &[Value]) -> Treatments {
        let parsed = parse_flag_set_params(args)
            .and_then(|params| Ok((params.single_name()?.to_string(), params)));
        match checked("get_treatments_by_flag_set", parsed) {
            Some((flag_set, params)) => self
                .client_for(params.key.as_ref())
                .get_treatments_by_flag_set(
                    &flag_set,
                    params.attributes.as_ref(),
                    params.options.as_ref(),
                ),
            None => Treatments::new(),
        }
    }

    pub fn get_treatments_with_config_by_flag_set(&self, args: &[Value]) -> TreatmentsWithConfig {
        let parsed = parse_flag_set_params(args)
            .and_then(|params| Ok((params.single_name()?.to_string(), params)));
        match checked("get_treatments_with_config_by_flag_set", parsed) {
            Some((flag_set, params)) => self
                .client_for(params.key.as_ref())
                .get_treatments_with_config_by_flag_set(
                    &flag_set,
                    params.attributes.as_ref(),
                    params.options.as_ref(),
                ),
            None => TreatmentsWithConfig::new(),
        }
    }

    pub fn get_treatments_by_flag_sets(&self, args: &[Value]) -> Treatments {
        match checked("get_treatments_by_flag_sets", parse_flag_set_params(args)) {
            Some(params) => self
                .client_for(params.key.as_ref())
                .get_treatments_by_flag_sets(
                    &name_list(&params.names),
                    params.attributes.as_ref(),
                    params.options.as_ref(),
                ),
            None => Treatments::new(),
        }
    }

    pub fn get_treatments_with_config_by_flag_sets(&self, args: &[Value]) -> TreatmentsWithConfig {
        match checked(
            "get_treatments_with_config_by_flag_sets",
            parse_flag_set_params(args),
        ) {
            Some(params) => self
                .client_for(params.key.as_ref())
                .get_treatments_with_config_by_flag_sets(
                    &name_list(&params.names),
                    params.attributes.as_ref(),
                    params.options.as_ref(),
                ),
            None => TreatmentsWithConfig::new(),
        }
    }

    /// `(traffic_type, event_type, value?, properties?)`, optionally preceded
    /// by a key. A string in third position always means the keyed form.
    pub fn track(&self, args: &[Value]) -> bool {
        match checked("track", parse_track_params(args)) {
            Some(params) => self.client_for(params.key.as_ref()).track(
                &params.traffic_type,
                &params.event_type,
                params.value,
                params.properties.as_ref(),
            ),
            None => false,
        }
    }

    pub fn get_splits(&self) -> Vec<SplitView> {
        self.manager().splits()
    }

    pub fn get_split(&self, feature_flag_name: &str) -> Option<SplitView> {
        self.manager().split(feature_flag_name)
    }

    pub fn get_split_names(&self) -> Vec<String> {
        self.manager().names()
    }

    /// Destroys every shared client, then the main client, and closes all
    /// streams and signals. Does nothing when not initialized.
    ///
    /// Returns the last error reported by a client, after trying them all.
    pub async fn destroy(&self) -> Result<(), SplitError> {
        let clients = match self.registry.take(|| {
            self.bridge.clear();
            self.status.complete();
        }) {
            Some(clients) => clients,
            None => return Ok(()),
        };

        let mut res = Ok(());
        for (instance, client) in clients {
            if let Err(err) = client.destroy().await {
                event!(Level::ERROR, key = %instance, "failed to destroy client: {}", err);
                res = Err(SplitError::Sdk(err));
            }
        }
        self.log_debug("SDK destroyed");
        res
    }

    fn lookup(&self, key: Option<&SplitKey>) -> Result<(String, Arc<dyn SplitClient>), SplitError> {
        self.registry.lookup(key).map_err(|err| {
            event!(Level::ERROR, code = err.code(), "{}", err);
            err
        })
    }

    /// The client for `key`, or the control client after logging the miss.
    fn client_for(&self, key: Option<&SplitKey>) -> Arc<dyn SplitClient> {
        match self.lookup(key) {
            Ok((_, client)) => client,
            Err(_) => self.control.clone(),
        }
    }

    fn manager(&self) -> Arc<dyn SplitManager> {
        match self.registry.manager() {
            Some(manager) => manager,
            None => {
                event!(
                    Level::ERROR,
                    "the SDK has not been initialized, returning the default response"
                );
                self.default_manager.clone()
            }
        }
    }

    fn log_debug(&self, message: &str) {
        if self.debug.load(Ordering::SeqCst) {
            event!(Level::DEBUG, "{}", message);
        }
    }
}

fn checked<T>(method: &'static str, parsed: Result<T, SplitError>) -> Option<T> {
    match parsed {
        Ok(v) => Some(v),
        Err(err) => {
            event!(Level::ERROR, method, code = err.code(), "{}", err);
            None
        }
    }
}

fn name_list(names: &FlagNames) -> Vec<String> {
    match names {
        FlagNames::Single(name) => vec![name.clone()],
        FlagNames::List(names) => names.clone(),
    }
}
