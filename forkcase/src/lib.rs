//! Exhaustive combinatorial test-case generation and model-based exploration.
//!
//! This is the main entry point for forkcase. Test bodies pick values and
//! run side effects through a [`TestKit`]; every combination of picked values
//! becomes one runnable case. Stateful protocols are explored with a
//! [`StateDriver`] over guarded actions.

pub use forkcase_core::*;

// Re-export derive macros when available
#[cfg(feature = "derive")]
pub use forkcase_derive::*;
