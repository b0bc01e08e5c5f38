//! Socket ingestion: framing, the single-client listener, and the producer-side sender.

pub mod framing;
pub mod listener;
pub mod sender;

pub use framing::{FrameError, JsonFramer};
pub use listener::{
    CloseReason, IngestionListener, ListenerState, ListenerThread, ServeSummary, ShutdownHandle,
    ShutdownSignal, ACK_PAYLOAD,
};
pub use sender::SignalSender;
