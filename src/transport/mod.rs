//! Transport adaptation: whole-frame I/O over reliable ordered bytes.

mod stream;

pub use stream::FrameStream;
