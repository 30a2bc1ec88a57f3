//! Credential status probing and aggregation.
//!
//! The prober classifies one credential-capability pair at a time by firing
//! a deliberately minimal completion request and reading the upstream's
//! verdict; the aggregator drives it across every configured credential and
//! assembles the report the scheduler center consumes.

pub mod aggregate;
pub mod model;
pub mod probe;

pub use aggregate::Aggregator;
pub use model::{CapabilityResult, CapabilityState, CredentialStatus, Report, SystemStatus};
pub use probe::Prober;
