//! fxdesk Document Store
//!
//! Crash-safe read-modify-write primitive for JSON-shaped documents.
//!
//! # Contract
//!
//! - `read` returns the last committed document, or `Default` when the key
//!   has never been written.
//! - A commit is atomic: every reader observes either the fully-old or the
//!   fully-new document, never a partial one, including after a crash in the
//!   middle of a write. This holds for every backend; the file backend
//!   achieves it with a temporary file, `fsync`, and an atomic rename.
//! - `update` runs at most one read-modify-write per key at a time. Updates
//!   on distinct keys never wait on each other.
//! - A document that fails to parse is reported as corruption and left
//!   untouched on disk.
//!
//! # Example
//!
//! ```rust,ignore
//! use fxdesk_store::{DocumentKey, DocumentStore};
//!
//! let store = DocumentStore::open("data")?;
//! let key = DocumentKey::new("portfolios")?;
//! store.update(&key, |doc: &mut Portfolios| {
//!     doc.credit(user, amount);
//!     Ok::<_, StoreError>(())
//! })?;
//! ```

pub mod backend;
pub mod error;
pub mod store;

pub use backend::{DocumentBackend, FileBackend, MemoryBackend};
pub use error::{StoreError, StoreResult};
pub use store::{DocumentKey, DocumentStore};
