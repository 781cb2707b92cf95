//! billing.* callbacks

use serde_json::{Value, json};

use super::{HandlerResult, authorize, parse_required, require_str, to_value};
use crate::daemon::context::DaemonContext;
use crate::domain::{AssignmentKind, PlanTier};
use crate::ipc::messages::{DaemonError, DaemonEvent};

/// Handle billing.plan_upgraded - record the tier and grant its quota now
pub async fn handle_plan_upgraded(params: &Value, ctx: &DaemonContext) -> HandlerResult {
    authorize(params, ctx)?;
    let consumer_id = require_str(params, "consumer_id")?;
    let tier: PlanTier = parse_required(params, "tier")?;

    let (consumer, allocation) = ctx
        .distributor
        .on_plan_upgraded(consumer_id, tier)
        .await
        .map_err(|e| DaemonError::from(&e))?;
    if let Some(event) = DaemonEvent::from_allocation(&allocation) {
        ctx.broadcast(event);
    }

    Ok(json!({
        "consumer": to_value(&consumer)?,
        "allocation": to_value(&allocation)?,
    }))
}

/// Handle billing.lead_purchased - record a single purchased lead
pub async fn handle_lead_purchased(params: &Value, ctx: &DaemonContext) -> HandlerResult {
    authorize(params, ctx)?;
    let consumer_id = require_str(params, "consumer_id")?;
    let lead_id = require_str(params, "lead_id")?;

    let created = ctx
        .distributor
        .on_lead_purchased(consumer_id, lead_id)
        .await
        .map_err(|e| DaemonError::from(&e))?;
    if created {
        ctx.broadcast(DaemonEvent::assignments_created(
            consumer_id,
            AssignmentKind::Purchased.as_str(),
            &[lead_id.to_string()],
        ));
    }

    Ok(json!({ "consumer_id": consumer_id, "lead_id": lead_id, "created": created }))
}
