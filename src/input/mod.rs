//! Input handling module
//!
//! Raw input state tracking fed by translated boundary events.

mod state;

pub use state::Input;
