//! In-memory session store with per-session TTL expiration.
//!
//! This crate provides a session store where:
//! - Every session is removed a bounded time after its last write
//! - Each write cancels the pending expiration and schedules a new one
//! - An update racing the expiration deadline always keeps the session
//! - Session IDs come from a pluggable [`IdGenerator`]
//!
//! # Example
//!
//! ```rust,ignore
//! use lapse_session::{SessionStore, SessionValues, StoreConfig};
//!
//! let store = SessionStore::new(StoreConfig::default().with_ttl(Duration::from_secs(5)));
//!
//! let id = store.create()?;
//! let mut data = SessionValues::new();
//! data.insert("website".into(), "longhoang.de".into());
//! store.update(&id, data)?;
//! ```

mod config;
mod error;
mod id;
mod session;
mod store;
mod watcher;

pub use config::{ConfigError, ConfigResult, DEFAULT_TTL, EXPIRY_SLACK, StoreConfig};
pub use error::{Error, Result};
pub use id::{IdGenerator, UuidGenerator};
pub use session::{SessionInfo, SessionValues};
pub use store::{SessionStore, StoreStats};
