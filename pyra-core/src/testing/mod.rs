//! Test helper utilities shared by unit and integration tests.

pub mod helpers;
