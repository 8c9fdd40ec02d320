// SPDX-License-Identifier: MIT OR Apache-2.0
//! The background-sync data system: a memory store fed by a streaming or
//! polling source through the change notifier.

use crate::polling::PollingDataSource;
use crate::status::DataSourceStatusManager;
use crate::streaming::StreamingDataSource;
use crate::system::DataSystem;
use flagkit_config::{HttpConfig, ServiceEndpoints, SyncMethod};
use flagkit_core::{FlagDescriptor, SegmentDescriptor};
use flagkit_store::{ChangeNotifier, FlagChangeSet, ListenerHandle, MemoryStore, Store};
use reqwest::header::HeaderMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;

/// Owns the memory store and exactly one push or pull source.
pub struct BackgroundSync {
    store: Arc<MemoryStore>,
    notifier: Arc<ChangeNotifier<Arc<MemoryStore>, Arc<MemoryStore>>>,
    status: Arc<DataSourceStatusManager>,
    method: SyncMethod,
    endpoints: ServiceEndpoints,
    http_config: HttpConfig,
    headers: HeaderMap,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundSync {
    /// Assemble a background-sync system; nothing runs until
    /// [`DataSystem::initialize`].
    pub fn new(
        method: SyncMethod,
        endpoints: ServiceEndpoints,
        http_config: HttpConfig,
        headers: HeaderMap,
        status: Arc<DataSourceStatusManager>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(ChangeNotifier::new(store.clone(), store.clone()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            store,
            notifier,
            status,
            method,
            endpoints,
            http_config,
            headers,
            shutdown_tx,
            shutdown_rx,
            task: Mutex::new(None),
        }
    }

    /// Register a listener for the set of flag keys affected by each
    /// ruleset update.
    pub fn on_flag_change(
        &self,
        listener: impl Fn(&FlagChangeSet) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.notifier.on_flag_change(listener)
    }
}

impl Store for BackgroundSync {
    fn get_flag(&self, key: &str) -> Option<Arc<FlagDescriptor>> {
        self.store.get_flag(key)
    }

    fn get_segment(&self, key: &str) -> Option<Arc<SegmentDescriptor>> {
        self.store.get_segment(key)
    }

    fn all_flags(&self) -> HashMap<String, Arc<FlagDescriptor>> {
        self.store.all_flags()
    }

    fn all_segments(&self) -> HashMap<String, Arc<SegmentDescriptor>> {
        self.store.all_segments()
    }

    fn initialized(&self) -> bool {
        self.store.initialized()
    }
}

impl DataSystem for BackgroundSync {
    fn initialize(&self, handle: &Handle) {
        let destination = self.notifier.clone();
        let task = match &self.method {
            SyncMethod::Streaming(config) => {
                match StreamingDataSource::new(
                    config,
                    &self.endpoints,
                    &self.http_config,
                    self.headers.clone(),
                    destination,
                    self.status.clone(),
                    self.shutdown_rx.clone(),
                ) {
                    Ok(source) => handle.spawn(source.run()),
                    Err(err) => {
                        error!("could not construct streaming source: {err}");
                        return;
                    }
                }
            }
            SyncMethod::Polling(config) => {
                match PollingDataSource::new(
                    config,
                    &self.endpoints,
                    &self.http_config,
                    self.headers.clone(),
                    destination,
                    self.status.clone(),
                    self.shutdown_rx.clone(),
                ) {
                    Ok(source) => handle.spawn(source.run()),
                    Err(err) => {
                        error!("could not construct polling source: {err}");
                        return;
                    }
                }
            }
        };
        *self.task.lock().expect("task slot poisoned") = Some(task);
    }

    fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    fn identity(&self) -> String {
        match &self.method {
            SyncMethod::Streaming(_) => "background sync via streaming".to_owned(),
            SyncMethod::Polling(_) => "background sync via polling".to_owned(),
        }
    }
}
