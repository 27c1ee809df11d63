//! Shared utilities

pub mod arn;
pub mod logging;

pub use arn::{Arn, ArnError};
