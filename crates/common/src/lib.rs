//! Common utilities and types shared across depwatch components.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
