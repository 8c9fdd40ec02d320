// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod dependency;
pub mod expiration;
pub mod interfaces;
pub mod memory;
pub mod notifier;
pub mod persist;

pub use dependency::{DependencyMap, DependencySet, DependencyTracker};
pub use expiration::{ExpirationTracker, TrackState};
pub use interfaces::{Destination, Store};
pub use memory::MemoryStore;
pub use notifier::{ChangeNotifier, FlagChangeSet, ListenerHandle};
pub use persist::{PersistError, SerializedDataReader, SerializedItemDescriptor};
