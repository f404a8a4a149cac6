//! # Keyward Effects - Layer 3: Production Handlers
//!
//! Stateless, single-purpose implementations of the effect traits defined in
//! `keyward-core`, plus the plumbing binaries need around them.
//!
//! ## What Belongs Here
//!
//! - System clock and filesystem storage handlers
//! - The single-writer storage actor
//! - The composite `KeywardEffects` system
//! - Background task registry and tracing setup
//!
//! ## What Does NOT Belong Here
//!
//! - The HTTP co-signer client (`keyward-cosigner`)
//! - Recovery logic (`keyward-recovery`)
//! - Test doubles (`keyward-testkit`)

#![forbid(unsafe_code)]

pub mod composite;
pub mod logging;
pub mod single_writer;
pub mod storage;
pub mod task_registry;
pub mod time;

pub use composite::{KeywardEffects, UnavailableAppKeys};
pub use logging::init_tracing;
pub use single_writer::SingleWriterStorage;
pub use storage::FilesystemStorageHandler;
pub use task_registry::TaskRegistry;
pub use time::RealTimeHandler;
