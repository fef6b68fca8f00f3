//! `RelayChat` server library.
//!
//! Exposes the relay server for use in tests and embedding. The server
//! accepts TCP connections, registers each one, and forwards every chunk a
//! client sends to all other clients.

pub mod config;
pub mod console;
pub mod registry;
pub mod relay;
