//! `RelayChat` terminal client library.

pub mod app;
pub mod client;
pub mod config;
pub mod input;
pub mod session;
pub mod shutdown;
pub mod ui;
