//! # profcap
//!
//! Binary support: the command line, re-exported next to the core library so
//! integration tests can drive both.

pub mod cli;

pub use profcap_core;
