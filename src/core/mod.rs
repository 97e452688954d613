//! Core engine: PTY plumbing, VT100 tracking, sessions and the registry.

pub mod pty;
pub mod registry;
pub mod session;
pub mod term;
