//! Core functionality for forkcase exhaustive combinatorial testing.
//!
//! This crate provides the forker algebra that enumerates value combinations,
//! the two-phase test kit that turns a test body into runnable cases, and the
//! explorer for model-based state machine tests.

pub mod case;
pub mod condition;
pub mod context;
pub mod error;
pub mod explore;
pub mod fork;
pub mod kit;
pub mod sql;

// Re-export the main types
pub use case::*;
pub use condition::*;
pub use context::*;
pub use error::*;
pub use explore::*;
pub use fork::branch::{if_fork, Branches, IfThen};
pub use fork::chain::{budgeted, reaction, BudgetStage, Chain, Link, React};
pub use fork::container::{fork_map, fork_vec, fork_vec_optional, pair, triple, MapDisplay};
pub use fork::generation::Generate;
pub use fork::{Fork, ForkItem, ForkResult, Forker, Recorded};
pub use kit::*;
pub use sql::*;
