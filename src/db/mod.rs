//! Connection scopes.
//!
//! A connection scope decorates a physical connection so that nested units
//! of work can each begin and commit "their own" transaction while sharing
//! one physical transaction underneath.

mod async_connection;
mod config;
mod connection;

pub use async_connection::AsyncConnectionScope;
pub use config::ConnectionScopeConfig;
pub use connection::ConnectionScope;
