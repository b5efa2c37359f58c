//! fxdesk Common Types
//!
//! Shared types used across the fxdesk workspace: currencies and their kinds,
//! normalized currency pairs, quotes, identifiers, and the clock abstraction
//! every TTL calculation goes through.

pub mod identifiers;
pub mod monetary;
pub mod registry;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use registry::CurrencyRegistry;
pub use error::*;
pub use time::*;
