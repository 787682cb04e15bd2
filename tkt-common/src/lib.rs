//! # Ticketing Experiments Common Library
//!
//! Shared code for the ticketing experiment services:
//! - Error and result types
//! - Push event wire format (`PushEvent`)
//! - TOML configuration model and file resolution

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::PushEvent;
