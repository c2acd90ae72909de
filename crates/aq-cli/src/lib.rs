//! Library side of the `aq` binary.
//!
//! Command handlers live here so integration tests and other front ends can
//! drive them without spawning the process.

pub mod commands;
pub mod session;
