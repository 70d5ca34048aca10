/// Squad dashboard
///
/// Administrative web dashboard for Squad game servers: permission-gated
/// RCON commands, moderation records, the remote-admin whitelist and an
/// audit log of everything done through it.

pub mod admin;
pub mod api;
pub mod auth;
pub mod battlemetrics;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod rate_limit;
pub mod rcon;
pub mod server;

pub use config::ServerConfig;
pub use context::AppContext;
pub use error::{DashboardError, DashboardResult};
pub use server::build_router;
