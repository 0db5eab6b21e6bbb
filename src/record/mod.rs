//! Record layer: encrypted application traffic and in-band rekeying.

mod channel;

pub use channel::SecureChannel;
