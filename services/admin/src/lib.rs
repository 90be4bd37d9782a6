//! Portcullis admin service library crate.
//!
//! # Purpose
//! Exposes the menu tree store, role and user administration, policy
//! projection, HTTP API, configuration and storage backends for the binary
//! and tests.
//!
//! # Notes
//! Relational storage is the source of truth; the policy engine is a cache
//! rebuilt from it at startup and after every permission-affecting write.
pub mod api;
pub mod app;
pub mod config;
pub mod context;
pub mod model;
pub mod observability;
pub mod service;
pub mod store;
