//! Keyward Testing Infrastructure
//!
//! Deterministic handlers for every effect trait in `keyward-core`, a fake
//! co-signer server, and an onboarded wallet fixture.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]
//!
//! # Usage
//!
//! Add this to your crate's `Cargo.toml` dev-dependencies:
//! ```toml
//! [dev-dependencies]
//! keyward-testkit = { path = "../keyward-testkit" }
//! ```
//!
//! Then in your tests:
//! ```rust,no_run
//! use keyward_testkit::*;
//! use std::time::Duration;
//!
//! let wallet = WalletFixture::new(Duration::from_secs(7 * 24 * 3600));
//! wallet.time.advance(Duration::from_secs(60));
//! ```

pub mod cosigner;
pub mod effects;
pub mod fixtures;
pub mod keys;
pub mod signers;
pub mod storage;
pub mod time;

pub use cosigner::{CosignerOp, FakeCosigner};
pub use effects::TestEffects;
pub use fixtures::{spending_keys, WalletFixture};
pub use keys::{fake_sign, fake_verify, test_key};
pub use signers::{FakeAppKeys, FakeHardware};
pub use storage::MemoryStorageHandler;
pub use time::MockTimeHandler;
