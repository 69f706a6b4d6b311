//! Application wiring and run loop

pub mod run;
pub mod state;
