//! Core domain model for the server ownership claim subsystem.
//!
//! Pure logic, no I/O: verification methods, the claim status state
//! machine, token issuance, instruction rendering, and hostname/domain
//! utilities. Network probes and persistence live in the `holist-engine`
//! and `holist-storage` crates.

pub mod host;
pub mod instructions;
pub mod method;
pub mod policy;
pub mod status;
pub mod token;

pub use method::VerificationMethod;
pub use policy::ClaimPolicy;
pub use status::{
    effective_status, next_status, time_remaining_percent, ClaimEvent, ClaimStatus,
    TransitionError,
};
