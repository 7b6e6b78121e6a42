//! External command bridge for TabHive.
//!
//! Callers outside the engine speak a small JSON protocol:
//! `{command, args}` in, `{ok, result?, error?}` out. The bridge checks the
//! caller's origin, routes the command through the [`catalog`], and runs it
//! against the [`Engine`](tabhive_engine::Engine).

pub mod bridge;
pub mod catalog;

pub use bridge::{Caller, CommandRequest, ExternalBridge};
pub use catalog::{ArgSpec, CATALOG_VERSION, Command, CommandSpec, Route, Target};
