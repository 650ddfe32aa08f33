//! `spine-kernel` – policy and authorization.
//!
//! Nothing reaches contract issuance without passing through this crate.
//!
//! # Modules
//!
//! - [`policy`] – [`PolicyEngine`][policy::PolicyEngine]: ordered,
//!   severity-tagged rules evaluated over an
//!   [`Intent`][spine_lang::Intent], robust to a rule panicking.
//! - [`authorization`] – [`AuthorizationEngine`][authorization::AuthorizationEngine]:
//!   the fail-closed submission gate that mints proofs and caches results
//!   per intent name.

pub mod authorization;
pub mod policy;

pub use authorization::{AuthorizationEngine, AuthorizationResult};
pub use policy::{
    FnRule, ForbidTrustLevel, MaxDeadline, PolicyEngine, PolicyReport, PolicyRule,
    RequireAuthority, Severity,
};
