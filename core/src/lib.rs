// eventring core library
// In-process event bus over growable ring buffers

pub mod config;
pub mod event;
pub mod node;
pub mod payload;
pub mod ring_buffer;
pub mod telemetry;

// Export core types
pub use config::{BufferConfig, BusConfig};
pub use event::{EventBus, EventBusStats};
pub use node::EventNode;
pub use payload::{AppState, MathOperation, NodeId, Payload, ShortText, Sound, TaggedEvent};
pub use ring_buffer::RingBuffer;

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("buffer full (capacity {capacity})")]
    BufferFull { capacity: usize },

    #[error("buffer empty")]
    BufferEmpty,

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid buffer capacity: {0}")]
    InvalidCapacity(usize),

    #[error("{0} is not subscribed")]
    NotSubscribed(NodeId),

    #[error("already subscribed as {0}")]
    AlreadySubscribed(NodeId),

    #[error("event bus is shutting down")]
    ShuttingDown,

    /// Reported by the dispatcher when a mailbox is full; never returned from `publish`.
    #[error("delivery from {sender} to {recipient} dropped: mailbox full")]
    DeliveryDropped { recipient: NodeId, sender: NodeId },

    #[error("a dispatch loop is already running")]
    DispatcherRunning,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BusError>;
