//! Handshake engine: mutual authentication and traffic-key agreement.

mod engine;

pub use engine::{initiate, respond};
