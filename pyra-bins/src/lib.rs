//! Shared wiring for the pyra binaries.

pub mod common;
