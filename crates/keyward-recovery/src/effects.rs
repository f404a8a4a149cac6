//! Effect composition for recovery operations.
//!
//! Recovery operations need a clock, durable storage, the co-signer and the
//! app keystore. The hardware device is not part of the effect system: it is
//! passed to each command that needs a tap.
//!
//! # Usage
//!
//! ```ignore
//! use keyward_recovery::effects::RecoveryEffects;
//!
//! struct MyCoordinator<E: RecoveryEffects> {
//!     effects: Arc<E>,
//! }
//! ```

use keyward_core::effects::{
    AppKeyEffects, CosignerEffects, PhysicalTimeEffects, StorageEffects,
};

/// Composed effects required by the recovery state machine and rotation services.
pub trait RecoveryEffects:
    PhysicalTimeEffects + StorageEffects + CosignerEffects + AppKeyEffects + Send + Sync
{
}

/// Blanket implementation for any type that implements all required traits.
impl<T> RecoveryEffects for T where
    T: PhysicalTimeEffects + StorageEffects + CosignerEffects + AppKeyEffects + Send + Sync
{
}
