//! Signaling: the relay channel, the session registry and the engine that
//! drives offer/answer/candidate exchange over them.

mod attempt;
pub mod channel;
pub mod engine;
pub mod error;
pub mod observer;
mod pacing;
pub mod registry;
pub mod session;


pub use channel::SignalChannel;
pub use engine::SignalingEngine;
pub use error::SignalingError;
pub use observer::{PeersUpdate, SignalingObserver};
pub use registry::SessionRegistry;
pub use session::{Session, SessionInfo};
