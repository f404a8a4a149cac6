//! # Keyward Co-signer - Layer 3: HTTP Handler
//!
//! reqwest implementation of the co-signer effect traits from `keyward-core`.
//! Requests carry a bearer token per account and scope, plus proof of
//! possession headers where the endpoint requires them. Failed responses are
//! classified into [`CosignerError`] so callers can tell retryable outages
//! from stale proofs and conflicts.
//!
//! [`CosignerError`]: keyward_core::effects::CosignerError

#![forbid(unsafe_code)]

pub mod auth;
pub mod client;
pub mod status;

pub use auth::{AccessTokenProvider, AuthScope, StaticTokenProvider};
pub use client::HttpCosignerClient;
pub use status::classify_status;
