//! Lifecycle traits for injected services.

mod dispose;

pub use dispose::{AsyncDispose, Dispose};
