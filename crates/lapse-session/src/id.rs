//! Session ID generation.
//!
//! The store does not mint identifiers itself. It asks an injected
//! [`IdGenerator`] for one on every create, so callers can plug in their
//! own scheme (signed tokens, database sequences, deterministic IDs in
//! tests). [`UuidGenerator`] is the default.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::Result;

/// Source of session identifiers.
///
/// Returning an error aborts the create that asked for the ID; the store
/// registers nothing in that case.
pub trait IdGenerator: Send + Sync + 'static {
    /// Produce a new session ID.
    fn new_id(&self) -> Result<String>;
}

/// Generates random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn new_id(&self) -> Result<String> {
        Ok(Uuid::new_v4().to_string())
    }
}

impl<G: IdGenerator> IdGenerator for Arc<G> {
    fn new_id(&self) -> Result<String> {
        (**self).new_id()
    }
}
