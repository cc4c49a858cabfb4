use std::{collections::HashMap, sync::Arc};

use crossbeam::sync::ShardedLock;
use tracing::{event, Level};

use crate::{
    config::SplitConfig,
    error::SplitError,
    models::SplitKey,
    sdk::{SplitClient, SplitFactory, SplitManager, SplitSdk},
};

struct Instance {
    sdk: Arc<dyn SplitSdk>,
    manager: Arc<dyn SplitManager>,
    main_instance: String,
    clients: HashMap<String, Arc<dyn SplitClient>>,
}

/// Owns the SDK instance and one client handle per normalized key.
///
/// `attach` callbacks run under the write lock, before the new client is
/// visible to readers, so no event emitted by the client can be missed.
#[derive(Default)]
pub(crate) struct ClientRegistry {
    instance: ShardedLock<Option<Instance>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_initialized(&self) -> bool {
        self.instance
            .read()
            .expect("should always be able to acquire read lock")
            .is_some()
    }

    /// Creates the SDK and registers its main client. Returns the main
    /// client's instance key and handle.
    pub fn initialize<F>(
        &self,
        factory: &dyn SplitFactory,
        config: &SplitConfig,
        version: &str,
        attach: F,
    ) -> Result<(String, Arc<dyn SplitClient>), SplitError>
    where
        F: FnOnce(&str, &Arc<dyn SplitClient>),
    {
        let mut instance = self
            .instance
            .write()
            .expect("should always be able to acquire write lock");
        if instance.is_some() {
            return Err(SplitError::AlreadyInitialized);
        }

        let sdk = factory.create(config, version)?;
        let client = sdk.client(None);
        let manager = sdk.manager();
        let main_instance = config.core.key.instance_key();
        attach(&main_instance, &client);

        let mut clients = HashMap::new();
        clients.insert(main_instance.clone(), client.clone());
        *instance = Some(Instance {
            sdk,
            manager,
            main_instance: main_instance.clone(),
            clients,
        });
        Ok((main_instance, client))
    }

    /// Registers a shared client for `key`.
    pub fn create_client<F>(
        &self,
        key: &SplitKey,
        attach: F,
    ) -> Result<(String, Arc<dyn SplitClient>), SplitError>
    where
        F: FnOnce(&str, &Arc<dyn SplitClient>),
    {
        let mut guard = self
            .instance
            .write()
            .expect("should always be able to acquire write lock");
        let instance = guard.as_mut().ok_or(SplitError::NotInitialized)?;

        let instance_key = key.instance_key();
        if instance.clients.contains_key(&instance_key) {
            return Err(SplitError::AlreadyExists(instance_key));
        }

        let client = instance.sdk.client(Some(key));
        attach(&instance_key, &client);
        instance.clients.insert(instance_key.clone(), client.clone());
        event!(Level::TRACE, key = %instance_key, "client registered");
        Ok((instance_key, client))
    }

    /// Registered client for `key`, or the main client when `key` is `None`.
    pub fn lookup(
        &self,
        key: Option<&SplitKey>,
    ) -> Result<(String, Arc<dyn SplitClient>), SplitError> {
        let guard = self
            .instance
            .read()
            .expect("should always be able to acquire read lock");
        let instance = guard.as_ref().ok_or(SplitError::NotInitialized)?;
        let instance_key = match key {
            Some(key) => key.instance_key(),
            None => instance.main_instance.clone(),
        };
        match instance.clients.get(&instance_key) {
            Some(client) => Ok((instance_key, client.clone())),
            None => Err(SplitError::ClientNotInitialized(instance_key)),
        }
    }

    #[cfg(test)]
    pub fn main_instance(&self) -> Option<String> {
        self.instance
            .read()
            .expect("should always be able to acquire read lock")
            .as_ref()
            .map(|i| i.main_instance.clone())
    }

    pub fn sdk(&self) -> Option<Arc<dyn SplitSdk>> {
        self.instance
            .read()
            .expect("should always be able to acquire read lock")
            .as_ref()
            .map(|i| i.sdk.clone())
    }

    pub fn manager(&self) -> Option<Arc<dyn SplitManager>> {
        self.instance
            .read()
            .expect("should always be able to acquire read lock")
            .as_ref()
            .map(|i| i.manager.clone())
    }

    /// Empties the registry. Returns the clients to destroy, shared clients
    /// first and the main client last.
    ///
    /// `teardown` runs under the write lock, so a concurrent `initialize`
    /// only starts once it is done.
    pub fn take<F>(&self, teardown: F) -> Option<Vec<(String, Arc<dyn SplitClient>)>>
    where
        F: FnOnce(),
    {
        let mut guard = self
            .instance
            .write()
            .expect("should always be able to acquire write lock");
        let instance = guard.take()?;
        teardown();
        drop(guard);

        let mut clients = instance.clients;
        let main = clients.remove(&instance.main_instance);
        let mut ordered: Vec<_> = clients.into_iter().collect();
        ordered.extend(main.map(|client| (instance.main_instance, client)));
        Some(ordered)
    }
}
