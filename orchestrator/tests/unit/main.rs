//! Integration tests

mod common;
mod test_controller;
mod test_fsm;
mod test_monitor;
mod test_probe;
mod test_switcher;
