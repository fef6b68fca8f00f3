//! Shared protocol definitions for the `RelayChat` line format.
//!
//! The relay server forwards bytes verbatim; everything in this crate is the
//! convention clients layer on top of that stream.

pub mod command;
pub mod line;
