pub mod batch;
pub mod checksum;
pub mod constants;
pub mod error;
pub mod fields;
pub mod frame;
pub mod message;
pub mod session;
pub mod sim;
pub mod transport;

// Re-export the session types for easy access
pub use batch::{SettingsBatch, StatusBatch};
pub use error::LinkError;
pub use frame::{ChecksumPolicy, Frame};
pub use message::{Message, MessageKind, ProtocolRevision};
pub use session::{DeviceSession, LinkState, SessionConfig, SessionObserver};
pub use transport::Transport;
