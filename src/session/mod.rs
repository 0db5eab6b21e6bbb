//! Session state: identifiers, phase machine, sequence discipline and the
//! responder-side session registry.

mod registry;
mod state;

pub use registry::SessionRegistry;
pub use state::{SessionPhase, SessionState};
