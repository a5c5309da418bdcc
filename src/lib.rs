pub mod codec;
pub mod command;
pub mod constants;
pub mod error;
pub mod link;
pub mod motion;
pub mod response;
pub mod transport;

// Re-export the entry points for easy access
pub use error::FxError;
pub use link::{FxLink, LinkConfig};
pub use motion::{MotionConfig, MotionController, MovePhase, MoveSequence};
pub use transport::{SerialTransport, Transport};
