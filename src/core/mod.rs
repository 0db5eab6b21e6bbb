//! Core constants and error types (always included).

mod constants;
mod error;

pub use constants::*;
pub use error::{ChannelError, CodecError, CryptoError};

/// Convenience alias for channel results.
pub type ChannelResult<T> = Result<T, ChannelError>;
