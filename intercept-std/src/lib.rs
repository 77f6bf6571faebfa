//! # intercept-std
//!
//! Standard collaborators for the Intercept engine.
//!
//! This crate provides:
//! - **Key-value observation**: [`observation::observe`], a second consumer of
//!   per-object subtypes that cooperates with interception
//! - **Key-value coding**: [`kvc::KeyValueCoding`]
//! - **Forwarding proxies**: [`proxy::ObjectProxy`]
//! - **Standard hooks**: [`hooks::logging::LoggingHook`]
//! - **Testing utilities**: [`testing`]

#![deny(clippy::pub_use, clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core types
pub use intercept_core;

// Modules
pub mod hooks;
pub mod kvc;
pub mod observation;
pub mod proxy;
pub mod testing;
