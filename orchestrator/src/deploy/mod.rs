//! Deployment module

pub mod builder;
pub mod cleanup;
pub mod controller;
pub mod fsm;
pub mod supervisor;
pub mod sync;
