//! # devicehub-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define the **port trait** that storage adapters must implement:
//!   - `DeviceRepository`: transactional CRUD for devices
//! - Define the **driving/inbound** use-case struct:
//!   - `DeviceService`: validate, enforce cross-operation rules, persist
//! - Orchestrate domain objects without knowing *how* persistence works
//!
//! ## Dependency rule
//! Depends on `devicehub-domain` only.
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod ports;
pub mod services;
