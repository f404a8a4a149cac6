//! # Keyward CLI - Layer 7: Tooling
//!
//! The `keyward` binary, for operators and support engineers. It reads the
//! persisted recovery state of an account, evaluates its funds-lost risk and
//! validates configuration files. It holds no app keys and never signs.

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod handlers;

pub use cli::{Cli, Commands};
