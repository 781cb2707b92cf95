//! Lead record
//!
//! Leads form an append-only pool. The `sequence` number is assigned at
//! ingestion and defines the total order every consumer cursor walks.

use serde::{Deserialize, Serialize};

use crate::id::{generate_lead_id, now_ms};

/// A single lead in the shared pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lead {
    /// Unique identifier ("lead-1738300800123-2a")
    pub id: String,

    /// Strictly increasing ingestion order (1-based)
    pub sequence: i64,

    /// Opaque lead content
    pub payload: serde_json::Value,

    /// Unix timestamp in milliseconds
    pub created_at: i64,
}

impl Lead {
    /// Create a lead with a fresh ID at the given pool position
    pub fn new(sequence: i64, payload: serde_json::Value) -> Self {
        Self {
            id: generate_lead_id(sequence),
            sequence,
            payload,
            created_at: now_ms(),
        }
    }
}
