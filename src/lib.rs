//! Leadflow - fair lead distribution and assignment recycling
//!
//! Leads sit in one ordered pool. Each consumer walks the pool from its own
//! cursor, receiving leads it does not already hold, in amounts set by its plan
//! tier. Assignments a consumer marks for follow-up count down daily and
//! resurface when they reach zero.

pub mod allocator;
pub mod auth;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod distribution;
pub mod domain;
pub mod error;
pub mod id;
pub mod ipc;
pub mod quota;
pub mod recycling;
pub mod store;

pub use error::{LeadflowError, Result};
