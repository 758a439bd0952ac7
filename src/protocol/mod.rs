pub mod frame;
pub mod message;

pub use frame::{FrameWriter, parse_frame};
pub use message::{ChangeMessage, ChangeType};

/// Line an integration prints on stdout once it is reading frames.
pub const READY_SIGNAL: &str = "ready";

/// Argument key carrying the comma-separated destination roots.
pub const DESTINATIONS_ARG: &str = "destinations";
