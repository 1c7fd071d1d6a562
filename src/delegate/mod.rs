//! Delegates and the multiplexer that routes engine callbacks to them.
//!
//! - [`Callback`]: selector naming each callback, used for probing
//! - [`Delegate`]: a table of optional handlers
//! - [`DelegateMultiplexer`]: the three-tier router engines report to

pub mod callback;
pub mod handlers;
pub mod multiplexer;

pub use callback::{Callback, Capability};
pub use handlers::{Delegate, DelegateBuilder};
pub use multiplexer::DelegateMultiplexer;
