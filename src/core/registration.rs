//! # Exactly-once registration of the control-plane handle.
//!
//! [`Registration`] replaces a process-wide mutable singleton: it lives inside
//! an [`AgentContext`] that the host builds once at startup and passes by
//! reference to every component that needs the control-plane handle.
//!
//! ## Rules
//! - `setup` succeeds only once; later calls fail with
//!   [`RegistrationError::AlreadyRegistered`] and leave the stored handle untouched.
//! - `get` before `setup` fails with [`RegistrationError::NotRegistered`].
//! - Concurrent `setup` calls race safely; exactly one wins.

use std::sync::{Arc, OnceLock};

use crate::api::CloudApi;
use crate::error::RegistrationError;

/// Holds at most one handle for the lifetime of its owner.
pub struct Registration<A: ?Sized> {
    slot: OnceLock<Arc<A>>,
}

impl<A: ?Sized + Send + Sync> Registration<A> {
    pub fn new() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    /// Stores `api`; fails if a handle is already present.
    pub fn setup(&self, api: Arc<A>) -> Result<(), RegistrationError> {
        self.slot
            .set(api)
            .map_err(|_rejected| RegistrationError::AlreadyRegistered)
    }

    /// Returns the registered handle.
    pub fn get(&self) -> Result<Arc<A>, RegistrationError> {
        self.slot
            .get()
            .cloned()
            .ok_or(RegistrationError::NotRegistered)
    }

    pub fn is_registered(&self) -> bool {
        self.slot.get().is_some()
    }
}

impl<A: ?Sized + Send + Sync> Default for Registration<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Explicit context object handed to every component that needs the control plane.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use fleetlink::{AgentContext, RegistrationError};
///
/// let ctx = Arc::new(AgentContext::new());
/// assert_eq!(ctx.api().err(), Some(RegistrationError::NotRegistered));
/// ```
#[derive(Default)]
pub struct AgentContext {
    api: Registration<dyn CloudApi>,
}

impl AgentContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the control-plane API handle; see [`Registration::setup`].
    pub fn setup(&self, api: Arc<dyn CloudApi>) -> Result<(), RegistrationError> {
        self.api.setup(api)
    }

    /// Returns the registered control-plane API handle.
    pub fn api(&self) -> Result<Arc<dyn CloudApi>, RegistrationError> {
        self.api.get()
    }

    pub fn is_registered(&self) -> bool {
        self.api.is_registered()
    }
}
