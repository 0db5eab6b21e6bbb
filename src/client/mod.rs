//! High-level client API (TCP).

mod client;

pub use client::{ClientConfig, connect};
