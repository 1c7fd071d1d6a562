//! Base types and error handling.
//!
//! - [`NetError`]: transport errors with Chromium-style numeric codes
//! - [`DelegateError`]: defects in delegate routing
//! - [`TaskState`]: engine task lifecycle

pub mod context;
pub mod neterror;
pub mod taskstate;

pub use neterror::{DelegateError, NetError};
pub use taskstate::TaskState;

#[cfg(test)]
mod tests;
