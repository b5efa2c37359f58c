//! fxdesk Engine
//!
//! Trade execution against user portfolios, the user registry, and the
//! `TradeDesk` service that owns every long-lived component and runs each
//! usecase through one logging wrapper.

pub mod config;
pub mod desk;
pub mod error;
pub mod portfolio;
pub mod state;
pub mod trade;
pub mod usecase;
pub mod users;

pub use config::{ConfigError, DeskConfig};
pub use desk::{RateView, TradeDesk};
pub use error::{DeskError, DeskResult, TradeError, TradeResult, UserError, UserResult};
pub use portfolio::{Portfolio, PortfolioBook, PortfoliosDocument};
pub use state::DeskState;
pub use trade::{TradeEngine, TradeReceipt, TradeSide, Valuation, ValuationLine};
pub use users::{Session, User, UserRegistry};
