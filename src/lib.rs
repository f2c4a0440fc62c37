//! # R0N IP Allow
//!
//! Source-address access control for the R0N gateway.
//!
//! Every accepted connection is checked against a table of address ranges
//! before any request processing. The table is built from a human-edited
//! rules file, published atomically, and rebuilt in the background when the
//! file changes, without blocking lookups in flight.
//!
//! ## Modules
//!
//! - [`ip_allow`]: the rule parser, interval table, ACL table, reload
//!   controller and request-facing handler
//! - [`config`]: gateway TOML configuration and the rules file watcher
//! - [`telemetry`]: tracing subscriber setup

pub mod config;
pub mod ip_allow;
pub mod telemetry;
