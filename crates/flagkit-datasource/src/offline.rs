// SPDX-License-Identifier: MIT OR Apache-2.0
//! The offline data system: no data, no network.

use crate::status::{DataSourceState, DataSourceStatusManager};
use crate::system::DataSystem;
use flagkit_core::{FlagDescriptor, SegmentDescriptor};
use flagkit_store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;

/// A data system that never has any data. Every evaluation falls back to
/// the host-supplied default with `FLAG_NOT_FOUND`.
pub struct OfflineSystem {
    status: Arc<DataSourceStatusManager>,
}

impl OfflineSystem {
    /// Create the offline system.
    pub fn new(status: Arc<DataSourceStatusManager>) -> Self {
        Self { status }
    }
}

impl Store for OfflineSystem {
    fn get_flag(&self, _key: &str) -> Option<Arc<FlagDescriptor>> {
        None
    }

    fn get_segment(&self, _key: &str) -> Option<Arc<SegmentDescriptor>> {
        None
    }

    fn all_flags(&self) -> HashMap<String, Arc<FlagDescriptor>> {
        HashMap::new()
    }

    fn all_segments(&self) -> HashMap<String, Arc<SegmentDescriptor>> {
        HashMap::new()
    }

    fn initialized(&self) -> bool {
        true
    }
}

impl DataSystem for OfflineSystem {
    fn initialize(&self, _handle: &Handle) {
        self.status.set_state(DataSourceState::SetOffline);
    }

    fn shutdown(&self) {}

    fn identity(&self) -> String {
        "offline".to_owned()
    }
}
