//! Verification engine: probes for each verification method and the
//! claim lifecycle service that drives the state machine over a
//! `ClaimStore`.

pub mod error;
pub mod probe;
pub mod service;

pub use error::ClaimError;
pub use probe::{default_probes, DnsTxtProbe, EmailProbe, FileUploadProbe, MotdProbe, Probe,
    ProbeFailure, ProbeOutcome};
pub use service::{
    ClaimPage, ClaimService, ClaimStats, ClaimStatusResponse, ClaimView, InitiateOutcome,
    MethodInfo, ServerClaimsView, VerificationOutcome,
};
