//! Core engine module
//!
//! The orchestrator, the active scene, boundary events, middleware
//! hooks, and frame timing.

mod engine;
mod events;
mod middleware;
mod scene;
mod time;

pub use engine::{Engine, EngineConfig, EngineError, EngineState};
pub use events::{EventQueue, HostEvent};
pub use middleware::{Middleware, NullMiddleware};
pub use scene::{EntityRecord, Scene, SceneError, SceneId, SceneSnapshot};
pub use time::Time;
