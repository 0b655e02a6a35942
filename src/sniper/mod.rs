//! Claim coordination: vanity transition tracking, rotation and cooldown
//! bookkeeping, and the claim engine that ties them together.

pub mod dispatch;
pub mod engine;
pub mod ledger;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatch::Dispatcher;
pub use engine::{ClaimEngine, ClaimOutcome, ClaimSettings};
pub use ledger::{Ledger, Settlement, Slot};
pub use tracker::{AliasTracker, ObservationKind};
