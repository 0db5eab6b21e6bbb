//! High-level server API (TCP).

mod server;

pub use server::{SeclinkServer, ServerConfig};
