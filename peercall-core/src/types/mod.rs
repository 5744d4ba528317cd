pub mod call;
pub mod peer;
pub mod session;

pub use call::{CallState, InvalidTransition, MediaKind, SignalingState, UnknownMediaKind};
pub use peer::PeerId;
pub use session::SessionKey;
