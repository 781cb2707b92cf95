//! distribute.* and recycle.run handlers

use serde_json::Value;

use super::{HandlerResult, authorize, require_str, to_value};
use crate::daemon::context::DaemonContext;
use crate::distribution::DistributionTarget;
use crate::ipc::messages::{DaemonError, DaemonEvent};

/// Handle distribute.scheduled - today's quota for every active consumer
pub async fn handle_distribute_scheduled(params: &Value, ctx: &DaemonContext) -> HandlerResult {
    authorize(params, ctx)?;

    let report = ctx
        .distributor
        .scheduled_distribute_all()
        .await
        .map_err(|e| DaemonError::from(&e))?;
    for event in DaemonEvent::from_batch(&report) {
        ctx.broadcast(event);
    }
    to_value(&report)
}

/// Handle distribute.admin - fixed count for one consumer or all active ones
pub async fn handle_distribute_admin(params: &Value, ctx: &DaemonContext) -> HandlerResult {
    authorize(params, ctx)?;

    let target: DistributionTarget = require_str(params, "target")?
        .parse()
        .map_err(|e| DaemonError::from(&e))?;
    let count = params["count"]
        .as_u64()
        .and_then(|c| u32::try_from(c).ok())
        .ok_or_else(|| DaemonError::invalid_params("Missing or invalid 'count' parameter"))?;

    let report = ctx
        .distributor
        .admin_distribute(&target, count)
        .await
        .map_err(|e| DaemonError::from(&e))?;
    for event in DaemonEvent::from_batch(&report) {
        ctx.broadcast(event);
    }
    to_value(&report)
}

/// Handle distribute.self - consumer asks for today's quota
pub async fn handle_distribute_self(params: &Value, ctx: &DaemonContext) -> HandlerResult {
    let consumer_id = require_str(params, "consumer_id")?;

    let outcome = ctx
        .distributor
        .self_distribute(consumer_id)
        .await
        .map_err(|e| DaemonError::from(&e))?;
    if let Some(event) = DaemonEvent::from_allocation(&outcome) {
        ctx.broadcast(event);
    }
    to_value(&outcome)
}

/// Handle recycle.run - sweep both collections for today
pub async fn handle_recycle_run(params: &Value, ctx: &DaemonContext) -> HandlerResult {
    authorize(params, ctx)?;

    let report = ctx.recycler.run_daily();
    ctx.broadcast(DaemonEvent::recycling_completed(&report));
    to_value(&report)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::domain::{Consumer, PlanTier};
    use crate::ipc::messages::{ErrorCode, Events, Methods};
    use crate::store::{AssignmentStore, ConsumerStore, LeadPoolStore};
    use serde_json::json;

    fn seed(store: &crate::store::SqliteStore, leads: usize) {
        for i in 0..leads {
            store.append_lead(json!({ "n": i })).unwrap();
        }
        store.upsert_consumer(&Consumer::new("a", PlanTier::Basic)).unwrap();
        store.upsert_consumer(&Consumer::new("b", PlanTier::Free)).unwrap();
    }

    #[tokio::test]
    async fn test_scheduled_requires_token() {
        let (_store, ctx) = context();
        let response = call(&ctx, Methods::DISTRIBUTE_SCHEDULED, json!({})).await;
        assert_eq!(response.error.unwrap().code, ErrorCode::UNAUTHORIZED);

        let response = call(&ctx, Methods::DISTRIBUTE_SCHEDULED, json!({ "token": "wrong" })).await;
        assert_eq!(response.error.unwrap().code, ErrorCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_scheduled_reports_and_broadcasts() {
        let (store, ctx) = context();
        seed(&store, 10);
        let mut events = ctx.subscribe();

        let response = call(&ctx, Methods::DISTRIBUTE_SCHEDULED, json!({ "token": TOKEN })).await;
        let report = response.result.unwrap();
        assert_eq!(report["total_assigned"], 5);
        assert_eq!(report["per_consumer"][1]["reason"], "quota not available today");

        let event = events.try_recv().unwrap();
        assert_eq!(event.event, Events::ASSIGNMENTS_CREATED);
        assert_eq!(event.data["consumer_id"], "a");
    }

    #[tokio::test]
    async fn test_scheduled_runs_once_per_day() {
        let (store, ctx) = context();
        seed(&store, 20);

        let first = call(&ctx, Methods::DISTRIBUTE_SCHEDULED, json!({ "token": TOKEN })).await;
        assert_eq!(first.result.unwrap()["total_assigned"], 5);

        let mut events = ctx.subscribe();
        let second = call(&ctx, Methods::DISTRIBUTE_SCHEDULED, json!({ "token": TOKEN })).await;
        let report = second.result.unwrap();
        assert_eq!(report["total_assigned"], 0);
        assert_eq!(report["already_ran"], true);
        assert!(events.try_recv().is_err());

        let held = store.held_lead_ids("a").unwrap();
        assert_eq!(held.len(), 5);
    }

    #[tokio::test]
    async fn test_admin_zero_count_is_nothing_requested() {
        let (store, ctx) = context();
        seed(&store, 3);
        let response = call(
            &ctx,
            Methods::DISTRIBUTE_ADMIN,
            json!({ "token": TOKEN, "target": "a", "count": 0 }),
        )
        .await;
        let report = response.result.unwrap();
        assert_eq!(report["total_assigned"], 0);
        assert_eq!(report["per_consumer"][0]["reason"], "nothing requested");
    }

    #[tokio::test]
    async fn test_admin_params_validated() {
        let (store, ctx) = context();
        seed(&store, 3);

        let missing = call(&ctx, Methods::DISTRIBUTE_ADMIN, json!({ "token": TOKEN, "target": "a" })).await;
        assert_eq!(missing.error.unwrap().code, ErrorCode::INVALID_PARAMS);

        let unknown = call(
            &ctx,
            Methods::DISTRIBUTE_ADMIN,
            json!({ "token": TOKEN, "target": "ghost", "count": 1 }),
        )
        .await;
        assert_eq!(unknown.error.unwrap().code, ErrorCode::NOT_FOUND);

        let all = call(
            &ctx,
            Methods::DISTRIBUTE_ADMIN,
            json!({ "token": TOKEN, "target": "all-active", "count": 2 }),
        )
        .await;
        assert_eq!(all.result.unwrap()["total_assigned"], 4);
    }

    #[tokio::test]
    async fn test_self_distribute_on_off_day() {
        let (store, ctx) = context();
        seed(&store, 3);
        let response = call(&ctx, Methods::DISTRIBUTE_SELF, json!({ "consumer_id": "b" })).await;
        let outcome = response.result.unwrap();
        assert_eq!(outcome["assigned_count"], 0);
        assert_eq!(outcome["reason"], "quota not available today");
    }

    #[tokio::test]
    async fn test_recycle_run_emits_event() {
        let (_store, ctx) = context();
        let mut events = ctx.subscribe();
        let response = call(&ctx, Methods::RECYCLE_RUN, json!({ "token": TOKEN })).await;
        assert!(response.is_success());
        assert_eq!(events.try_recv().unwrap().event, Events::RECYCLING_COMPLETED);

        let again = call(&ctx, Methods::RECYCLE_RUN, json!({ "token": TOKEN })).await;
        assert_eq!(again.result.unwrap()["subscription"]["already_ran"], true);
    }
}
