pub mod config;
pub mod error;
pub mod selectors;
pub mod types;

pub use config::{Config, HarvestConfig, SettleMode};
pub use error::{HarvestError, Result};
pub use selectors::Selectors;
pub use types::*;
