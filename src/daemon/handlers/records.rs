//! lead.*, consumer.* and assignment.* handlers
//!
//! The state the triggers work on. Writes to the pool and consumer directory
//! are privileged; reads and assignment status changes are not.

use serde_json::{Value, json};

use super::{HandlerResult, authorize, parse_or, parse_required, require_str, to_value};
use crate::daemon::context::DaemonContext;
use crate::domain::{AssignmentKind, AssignmentStatus, Consumer, PlanTier, SubscriptionStatus};
use crate::ipc::messages::DaemonError;

/// Handle lead.add - append a lead to the pool
pub fn handle_lead_add(params: &Value, ctx: &DaemonContext) -> HandlerResult {
    authorize(params, ctx)?;
    let payload = match &params["payload"] {
        Value::Null => json!({}),
        other => other.clone(),
    };

    let lead = ctx.store.append_lead(payload).map_err(|e| DaemonError::from(&e))?;
    log::info!("Added lead {} at sequence {}", lead.id, lead.sequence);
    to_value(&lead)
}

/// Handle lead.list - the pool in sequence order
pub fn handle_lead_list(ctx: &DaemonContext) -> HandlerResult {
    let leads = ctx.store.list_leads().map_err(|e| DaemonError::from(&e))?;
    Ok(json!({ "leads": to_value(&leads)? }))
}

/// Handle consumer.upsert - create or update plan/subscription (cursor kept)
pub fn handle_consumer_upsert(params: &Value, ctx: &DaemonContext) -> HandlerResult {
    authorize(params, ctx)?;
    let consumer_id = require_str(params, "id")?;
    let tier: PlanTier = parse_required(params, "tier")?;
    let subscription = parse_or(params, "subscription", SubscriptionStatus::Active)?;

    let consumer = Consumer::new(consumer_id, tier).with_subscription(subscription);
    ctx.store.upsert_consumer(&consumer).map_err(|e| DaemonError::from(&e))?;

    let stored = ctx
        .store
        .get_consumer(consumer_id)
        .map_err(|e| DaemonError::from(&e))?
        .ok_or_else(|| DaemonError::internal_error(format!("Consumer {} vanished after upsert", consumer_id)))?;
    to_value(&stored)
}

/// Handle consumer.get
pub fn handle_consumer_get(params: &Value, ctx: &DaemonContext) -> HandlerResult {
    let consumer_id = require_str(params, "id")?;
    match ctx.store.get_consumer(consumer_id).map_err(|e| DaemonError::from(&e))? {
        Some(consumer) => to_value(&consumer),
        None => Err(DaemonError::not_found(format!("Consumer not found: {}", consumer_id))),
    }
}

/// Handle assignment.list - one collection for one consumer
pub fn handle_assignment_list(params: &Value, ctx: &DaemonContext) -> HandlerResult {
    let consumer_id = require_str(params, "consumer_id")?;
    let kind = parse_or(params, "kind", AssignmentKind::Subscription)?;

    let assignments = ctx
        .store
        .list_assignments(kind, consumer_id)
        .map_err(|e| DaemonError::from(&e))?;
    Ok(json!({ "assignments": to_value(&assignments)? }))
}

/// Handle assignment.update - consumer changes a lead's status
pub fn handle_assignment_update(params: &Value, ctx: &DaemonContext) -> HandlerResult {
    let consumer_id = require_str(params, "consumer_id")?;
    let lead_id = require_str(params, "lead_id")?;
    let kind = parse_or(params, "kind", AssignmentKind::Subscription)?;
    let status: AssignmentStatus = parse_required(params, "status")?;
    let countdown_days = match &params["countdown_days"] {
        Value::Null => None,
        value => Some(
            value
                .as_u64()
                .and_then(|d| u32::try_from(d).ok())
                .ok_or_else(|| DaemonError::invalid_params("'countdown_days' must be a non-negative integer"))?,
        ),
    };

    let assignment = ctx
        .store
        .update_assignment(kind, consumer_id, lead_id, status, countdown_days)
        .map_err(|e| DaemonError::from(&e))?;
    to_value(&assignment)
}
