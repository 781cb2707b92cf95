//! Domain types for Leadflow
//!
//! This module contains all core domain types:
//! - Lead: An opaque, immutable entry in the ordered lead pool
//! - Consumer: A subscriber with a plan tier and a pool cursor
//! - Assignment: A (consumer, lead) pair with status/action/countdown state

pub mod assignment;
pub mod consumer;
pub mod lead;

pub use assignment::{Assignment, AssignmentAction, AssignmentKind, AssignmentStatus, DecayEffect};
pub use consumer::{Consumer, PlanTier, SubscriptionStatus};
pub use lead::Lead;
