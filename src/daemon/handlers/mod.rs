//! Request handlers for the daemon
//!
//! Each submodule handles a category of IPC methods:
//! - triggers: distribute.* and recycle.run
//! - billing: billing.* callbacks
//! - records: lead.*, consumer.*, assignment.*

pub mod billing;
pub mod records;
pub mod triggers;

use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;

use crate::daemon::context::DaemonContext;
use crate::error::LeadflowError;
use crate::ipc::messages::{DaemonError, DaemonRequest, DaemonResponse, Methods};
use crate::ipc::server::RequestHandler;

pub use billing::*;
pub use records::*;
pub use triggers::*;

/// What every handler returns before it is wrapped in a response
pub type HandlerResult = std::result::Result<Value, DaemonError>;

/// Routes IPC requests into the daemon context
pub struct DaemonHandler {
    ctx: Arc<DaemonContext>,
}

impl DaemonHandler {
    pub fn new(ctx: Arc<DaemonContext>) -> Self {
        Self { ctx }
    }
}

impl RequestHandler for DaemonHandler {
    fn handle(&self, request: DaemonRequest) -> impl std::future::Future<Output = DaemonResponse> + Send {
        let ctx = Arc::clone(&self.ctx);
        async move { route(request, &ctx).await }
    }
}

/// Dispatch one request by method name
pub async fn route(request: DaemonRequest, ctx: &DaemonContext) -> DaemonResponse {
    let id = request.id;
    let params = &request.params;
    log::debug!("Handling {} (id={})", request.method, id);

    let result = match request.method.as_str() {
        Methods::PING => Ok(serde_json::json!({ "pong": true, "version": env!("CARGO_PKG_VERSION") })),
        Methods::DISTRIBUTE_SCHEDULED => handle_distribute_scheduled(params, ctx).await,
        Methods::DISTRIBUTE_ADMIN => handle_distribute_admin(params, ctx).await,
        Methods::DISTRIBUTE_SELF => handle_distribute_self(params, ctx).await,
        Methods::RECYCLE_RUN => handle_recycle_run(params, ctx).await,
        Methods::BILLING_PLAN_UPGRADED => handle_plan_upgraded(params, ctx).await,
        Methods::BILLING_LEAD_PURCHASED => handle_lead_purchased(params, ctx).await,
        Methods::LEAD_ADD => handle_lead_add(params, ctx),
        Methods::LEAD_LIST => handle_lead_list(ctx),
        Methods::CONSUMER_UPSERT => handle_consumer_upsert(params, ctx),
        Methods::CONSUMER_GET => handle_consumer_get(params, ctx),
        Methods::ASSIGNMENT_LIST => handle_assignment_list(params, ctx),
        Methods::ASSIGNMENT_UPDATE => handle_assignment_update(params, ctx),
        other => Err(DaemonError::method_not_found(other)),
    };

    match result {
        Ok(value) => DaemonResponse::success(id, value),
        Err(error) => {
            log::debug!("{} (id={}) failed: {}", request.method, id, error.message);
            DaemonResponse::error(id, error)
        }
    }
}

/// Check the `token` param against the shared secret
pub(crate) fn authorize(params: &Value, ctx: &DaemonContext) -> std::result::Result<(), DaemonError> {
    ctx.auth.verify(params["token"].as_str()).map_err(|e| {
        log::warn!("Rejected privileged request: {}", e);
        DaemonError::from(&e)
    })
}

pub(crate) fn require_str<'a>(params: &'a Value, name: &str) -> std::result::Result<&'a str, DaemonError> {
    params[name]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DaemonError::invalid_params(format!("Missing '{}' parameter", name)))
}

/// Parse a string param, falling back to `default` when absent
pub(crate) fn parse_or<T>(params: &Value, name: &str, default: T) -> std::result::Result<T, DaemonError>
where
    T: FromStr<Err = LeadflowError>,
{
    match params[name].as_str() {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: LeadflowError| DaemonError::from(&e)),
    }
}

pub(crate) fn parse_required<T>(params: &Value, name: &str) -> std::result::Result<T, DaemonError>
where
    T: FromStr<Err = LeadflowError>,
{
    require_str(params, name)?
        .parse()
        .map_err(|e: LeadflowError| DaemonError::from(&e))
}

pub(crate) fn to_value<T: serde::Serialize>(value: &T) -> HandlerResult {
    serde_json::to_value(value).map_err(|e| DaemonError::internal_error(format!("Failed to serialize result: {}", e)))
}
