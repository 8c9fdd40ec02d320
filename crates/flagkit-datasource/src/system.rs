// SPDX-License-Identifier: MIT OR Apache-2.0
//! The data-system trait the client evaluates against.

use flagkit_store::Store;
use tokio::runtime::Handle;

/// A component that maintains (or pretends to maintain) the local ruleset.
///
/// All read methods come from [`Store`]; a data system adds lifecycle.
/// Readiness is observed through the data-source status manager rather
/// than a return value: initialization completes when the status becomes
/// valid (or the system is deliberately offline).
pub trait DataSystem: Store {
    /// Start any background work on the given runtime. Returns
    /// immediately.
    fn initialize(&self, handle: &Handle);

    /// Ask background work to stop. Idempotent; actual quiescence is
    /// awaited by the owner via the runtime shutdown.
    fn shutdown(&self);

    /// A short description for logs.
    fn identity(&self) -> String;
}
