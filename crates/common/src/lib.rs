//! Ambient utilities shared by peg node binaries and tests.

pub mod logging;
