//! IPC layer: JSON lines over a Unix socket between the daemon and its clients
//! (CLI, scheduler hooks, billing bridge).

pub mod client;
pub mod messages;
pub mod server;

pub use client::IpcClient;
pub use messages::{DaemonError, DaemonEvent, DaemonRequest, DaemonResponse, ErrorCode, Events, Methods};
pub use server::{IpcServer, IpcServerConfig, RequestHandler};
