//! Reverse proxy routing

pub mod directive;
pub mod reload;
pub mod switcher;
