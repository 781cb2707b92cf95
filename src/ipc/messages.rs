//! IPC message types for client ↔ daemon communication.
//!
//! JSON Lines (newline-delimited JSON) over a Unix stream socket. Field names
//! follow the familiar id/method/params/result/error shape, but this is not
//! JSON-RPC 2.0.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::allocator::AllocationOutcome;
use crate::distribution::BatchReport;
use crate::error::LeadflowError;
use crate::recycling::RecyclingReport;

/// Request sent to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    /// Unique request ID for correlating responses.
    pub id: u64,
    /// Method name (e.g., "distribute.self", "recycle.run").
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl DaemonRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

/// Response sent by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DaemonError>,
}

impl DaemonResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: u64, error: DaemonError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Error details in a daemon response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl DaemonError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i32, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Parse error (-32700).
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PARSE_ERROR, message)
    }

    /// Invalid request error (-32600).
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_REQUEST, message)
    }

    /// Method not found error (-32601).
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(ErrorCode::METHOD_NOT_FOUND, format!("Unknown method: {}", method.into()))
    }

    /// Invalid params error (-32602).
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_PARAMS, message)
    }

    /// Internal error (-32603).
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INTERNAL_ERROR, message)
    }

    /// Consumer, lead or assignment not found (1001).
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NOT_FOUND, message)
    }

    /// Missing or wrong shared secret (1003).
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UNAUTHORIZED, message)
    }

    /// Transient contention; same request may be retried (1005).
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::with_data(ErrorCode::RETRYABLE, message, serde_json::json!({ "retryable": true }))
    }

    pub fn is_retryable(&self) -> bool {
        self.code == ErrorCode::RETRYABLE
    }
}

impl From<&LeadflowError> for DaemonError {
    fn from(err: &LeadflowError) -> Self {
        match err {
            LeadflowError::ConsumerNotFound(_)
            | LeadflowError::LeadNotFound(_)
            | LeadflowError::AssignmentNotFound { .. } => DaemonError::not_found(err.to_string()),
            LeadflowError::LockTimeout { .. } | LeadflowError::CursorConflict { .. } => {
                DaemonError::retryable(err.to_string())
            }
            LeadflowError::Unauthorized(_) => DaemonError::unauthorized(err.to_string()),
            LeadflowError::InvalidInput(_) => DaemonError::invalid_params(err.to_string()),
            _ => DaemonError::internal_error(err.to_string()),
        }
    }
}

/// Standard error codes.
pub struct ErrorCode;

impl ErrorCode {
    /// Invalid JSON.
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Unknown method.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal daemon error.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Consumer, lead or assignment doesn't exist.
    pub const NOT_FOUND: i32 = 1001;
    /// Missing or wrong shared secret.
    pub const UNAUTHORIZED: i32 = 1003;
    /// Lock timeout or cursor conflict.
    pub const RETRYABLE: i32 = 1005;
}

/// Push event sent to subscribed clients (no request ID).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonEvent {
    /// Event type (e.g., "assignments.created").
    pub event: String,
    pub data: Value,
}

impl DaemonEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Leads newly assigned to one consumer
    pub fn assignments_created(consumer_id: &str, kind: &str, lead_ids: &[String]) -> Self {
        Self::new(
            Events::ASSIGNMENTS_CREATED,
            serde_json::json!({
                "consumer_id": consumer_id,
                "kind": kind,
                "lead_ids": lead_ids,
            }),
        )
    }

    /// One event per consumer that received subscription leads in the batch
    pub fn from_batch(report: &BatchReport) -> Vec<Self> {
        report
            .created()
            .map(|(consumer_id, lead_ids)| Self::assignments_created(consumer_id, "subscription", lead_ids))
            .collect()
    }

    /// Event for a single allocation, if it created anything
    pub fn from_allocation(outcome: &AllocationOutcome) -> Option<Self> {
        if outcome.created_lead_ids.is_empty() {
            return None;
        }
        Some(Self::assignments_created(
            &outcome.consumer_id,
            "subscription",
            &outcome.created_lead_ids,
        ))
    }

    pub fn recycling_completed(report: &RecyclingReport) -> Self {
        Self::new(
            Events::RECYCLING_COMPLETED,
            serde_json::to_value(report).unwrap_or(Value::Null),
        )
    }
}

/// Known method names as constants.
pub struct Methods;

impl Methods {
    pub const PING: &'static str = "ping";
    pub const SUBSCRIBE: &'static str = "subscribe";

    // Triggers
    pub const DISTRIBUTE_SCHEDULED: &'static str = "distribute.scheduled";
    pub const DISTRIBUTE_ADMIN: &'static str = "distribute.admin";
    pub const DISTRIBUTE_SELF: &'static str = "distribute.self";
    pub const RECYCLE_RUN: &'static str = "recycle.run";

    // Billing callbacks
    pub const BILLING_PLAN_UPGRADED: &'static str = "billing.plan_upgraded";
    pub const BILLING_LEAD_PURCHASED: &'static str = "billing.lead_purchased";

    // Collaborator state
    pub const LEAD_ADD: &'static str = "lead.add";
    pub const LEAD_LIST: &'static str = "lead.list";
    pub const CONSUMER_UPSERT: &'static str = "consumer.upsert";
    pub const CONSUMER_GET: &'static str = "consumer.get";
    pub const ASSIGNMENT_LIST: &'static str = "assignment.list";
    pub const ASSIGNMENT_UPDATE: &'static str = "assignment.update";
}

/// Known event names as constants.
pub struct Events;

impl Events {
    pub const ASSIGNMENTS_CREATED: &'static str = "assignments.created";
    pub const RECYCLING_COMPLETED: &'static str = "recycling.completed";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parses_without_params() {
        let req: DaemonRequest = serde_json::from_str(r#"{"id":7,"method":"ping"}"#).unwrap();
        assert_eq!(req.id, 7);
        assert!(req.params.is_null());
    }

    #[test]
    fn test_response_omits_empty_fields() {
        let json = serde_json::to_string(&DaemonResponse::success(1, serde_json::json!({"ok": true}))).unwrap();
        assert!(!json.contains("error"));
    }

    #[test]
    fn test_error_mapping() {
        let not_found: DaemonError = (&LeadflowError::ConsumerNotFound("c".into())).into();
        assert_eq!(not_found.code, ErrorCode::NOT_FOUND);

        let timeout: DaemonError = (&LeadflowError::LockTimeout {
            consumer_id: "c".into(),
            waited_ms: 10,
        })
            .into();
        assert!(timeout.is_retryable());
        assert_eq!(timeout.data.unwrap()["retryable"], true);

        let denied: DaemonError = (&LeadflowError::Unauthorized("bad".into())).into();
        assert_eq!(denied.code, ErrorCode::UNAUTHORIZED);

        let invalid: DaemonError = (&LeadflowError::InvalidInput("x".into())).into();
        assert_eq!(invalid.code, ErrorCode::INVALID_PARAMS);

        let storage: DaemonError = (&LeadflowError::Storage("disk".into())).into();
        assert_eq!(storage.code, ErrorCode::INTERNAL_ERROR);
    }

    #[test]
    fn test_allocation_event_only_when_created() {
        let noop = AllocationOutcome::noop("c-1", 0, "nothing requested");
        assert!(DaemonEvent::from_allocation(&noop).is_none());

        let outcome = AllocationOutcome {
            created_lead_ids: vec!["l-1".to_string()],
            assigned_count: 1,
            reason: None,
            ..noop
        };
        let event = DaemonEvent::from_allocation(&outcome).unwrap();
        assert_eq!(event.event, Events::ASSIGNMENTS_CREATED);
        assert_eq!(event.data["lead_ids"][0], "l-1");
    }

    #[test]
    fn test_recycling_event_carries_report() {
        let event = DaemonEvent::recycling_completed(&RecyclingReport::default());
        assert_eq!(event.event, "recycling.completed");
        assert!(event.data["errors"].as_array().unwrap().is_empty());
    }
}
