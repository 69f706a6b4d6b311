//! slotctl library
//!
//! Blue/green slot deployment engine: health-gated promotion of a staged
//! slot, traffic switching through the reverse proxy, and automated failback
//! when the live slot degrades.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod monitor;
pub mod proxy;
pub mod server;
pub mod shell;
pub mod status;
pub mod stop;
pub mod storage;
pub mod utils;
