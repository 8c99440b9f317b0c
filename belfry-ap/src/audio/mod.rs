//! Audio coordination layer: backend capability, per-lane channel state,
//! and the priority arbiter over the three lanes.

pub mod backend;
pub mod channel;
pub mod engine;

pub use backend::{MediaBackend, NullBackend};
pub use channel::Channel;
pub use engine::{AudioEngine, EngineOptions, EngineStatus};
