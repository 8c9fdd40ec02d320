// SPDX-License-Identifier: MIT OR Apache-2.0
//! Data-source health tracking.

use std::sync::{Arc, Mutex, Weak};
use std::time::SystemTime;

/// Health of the data system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataSourceState {
    /// Starting up; no ruleset ingested yet.
    Initializing,
    /// Connected and current.
    Valid,
    /// Temporarily degraded; serving the last-known ruleset.
    Interrupted,
    /// Permanently stopped (unrecoverable error or shutdown).
    Off,
    /// Deliberately offline by configuration.
    SetOffline,
}

/// Classification of the most recent data-source error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport-level failure.
    NetworkError,
    /// An HTTP error status from the service.
    ErrorResponse,
    /// Malformed or schema-violating payload.
    InvalidData,
    /// A persistent-store failure.
    StoreError,
    /// Anything else.
    Unknown,
}

/// Details of the most recent error.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorInfo {
    /// Classification.
    pub kind: ErrorKind,
    /// HTTP status, when the error was an error response.
    pub status_code: Option<u16>,
    /// Human-readable description.
    pub message: String,
    /// When the error occurred.
    pub time: SystemTime,
}

/// A snapshot of the data source's status.
#[derive(Clone, Debug, PartialEq)]
pub struct DataSourceStatus {
    /// Current state.
    pub state: DataSourceState,
    /// When the state last changed.
    pub state_since: SystemTime,
    /// The most recent error, if any has occurred.
    pub last_error: Option<ErrorInfo>,
}

type Listener = Arc<dyn Fn(DataSourceStatus) + Send + Sync>;

struct Listeners {
    entries: Vec<(u64, Listener)>,
    next_id: u64,
}

/// Handle for a registered status listener; dropping it unregisters.
pub struct StatusListenerHandle {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Drop for StatusListenerHandle {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            let mut guard = listeners.lock().expect("status listeners poisoned");
            guard.entries.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Serializes data-source state transitions and notifies listeners.
///
/// Transitions to the same state are suppressed. Requesting `Interrupted`
/// while still `Initializing` keeps the state `Initializing`: an
/// interruption during startup is not a step backwards. Listeners are
/// invoked outside the state lock.
pub struct DataSourceStatusManager {
    state: Mutex<DataSourceStatus>,
    listeners: Arc<Mutex<Listeners>>,
}

impl Default for DataSourceStatusManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSourceStatusManager {
    /// A manager starting in `Initializing`.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DataSourceStatus {
                state: DataSourceState::Initializing,
                state_since: SystemTime::now(),
                last_error: None,
            }),
            listeners: Arc::new(Mutex::new(Listeners {
                entries: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// The current status snapshot.
    pub fn status(&self) -> DataSourceStatus {
        self.state.lock().expect("status lock poisoned").clone()
    }

    /// Register a status-change listener.
    pub fn on_status_change(
        &self,
        listener: impl Fn(DataSourceStatus) + Send + Sync + 'static,
    ) -> StatusListenerHandle {
        let mut guard = self.listeners.lock().expect("status listeners poisoned");
        let id = guard.next_id;
        guard.next_id += 1;
        guard.entries.push((id, Arc::new(listener)));
        StatusListenerHandle {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Transition to `state`, keeping any recorded error.
    pub fn set_state(&self, state: DataSourceState) {
        self.transition(state, None);
    }

    /// Transition to `state` recording an error classified by kind.
    pub fn set_state_with_error(&self, state: DataSourceState, kind: ErrorKind, message: &str) {
        self.transition(
            state,
            Some(ErrorInfo {
                kind,
                status_code: None,
                message: message.to_owned(),
                time: SystemTime::now(),
            }),
        );
    }

    /// Transition to `state` recording an HTTP error response.
    pub fn set_state_with_status_code(
        &self,
        state: DataSourceState,
        status_code: u16,
        message: &str,
    ) {
        self.transition(
            state,
            Some(ErrorInfo {
                kind: ErrorKind::ErrorResponse,
                status_code: Some(status_code),
                message: message.to_owned(),
                time: SystemTime::now(),
            }),
        );
    }

    /// Record an error without requesting a state change (used for schema
    /// failures where the stream stays up).
    pub fn set_error(&self, kind: ErrorKind, message: &str) {
        let mut guard = self.state.lock().expect("status lock poisoned");
        guard.last_error = Some(ErrorInfo {
            kind,
            status_code: None,
            message: message.to_owned(),
            time: SystemTime::now(),
        });
    }

    fn transition(&self, requested: DataSourceState, error: Option<ErrorInfo>) {
        let emitted = {
            let mut guard = self.state.lock().expect("status lock poisoned");
            // An interruption while initializing is still initializing.
            let effective = if requested == DataSourceState::Interrupted
                && guard.state == DataSourceState::Initializing
            {
                DataSourceState::Initializing
            } else {
                requested
            };

            if let Some(error) = error {
                guard.last_error = Some(error);
            }
            if guard.state == effective {
                None
            } else {
                guard.state = effective;
                guard.state_since = SystemTime::now();
                Some(guard.clone())
            }
        };

        if let Some(status) = emitted {
            let snapshot: Vec<Listener> = {
                let guard = self.listeners.lock().expect("status listeners poisoned");
                guard.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
            };
            for listener in snapshot {
                listener(status.clone());
            }
        }
    }
}
