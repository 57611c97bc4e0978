//! Script-engine bridge module
//!
//! Named native callbacks with primitive signatures, dispatched through
//! an explicit registry.

mod bridge;

pub use bridge::{HostApi, NativeFn, ScriptArgs, ScriptBridge, ScriptError, ScriptValue};
