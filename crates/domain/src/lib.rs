//! # devicehub-domain
//!
//! Pure domain model for the devicehub device inventory.
//!
//! ## Responsibilities
//! - Foundational types: device identifiers, the opaque row version token,
//!   error conventions
//! - Define the **Device** hierarchy: one shared base shape plus the closed
//!   set of variants (personal computer, smartwatch, embedded controller)
//! - Define the **validation** rules applied to incoming requests
//! - Contain all invariant enforcement and domain logic (`turn_on`,
//!   `apply_update`, type immutability)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod version;

pub mod device;
pub mod validation;
