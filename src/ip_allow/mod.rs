//! # IP Allow
//!
//! Source-address access control for incoming connections.
//!
//! Rules are read from a line-oriented file:
//!
//! ```text
//! # Allow loopback everything, deny PURGE and PUSH to the rest of 10/8.
//! src_ip=127.0.0.1 action=ip_allow method=ALL
//! src_ip=10.0.0.0-10.255.255.255 action=ip_deny method=PURGE|PUSH
//! ```
//!
//! Each rule maps an address range to a set of permitted methods. Later rules
//! override earlier ones where ranges overlap, and addresses covered by no
//! rule are denied.
//!
//! ## Components
//!
//! - [`MethodRegistry`]: method names and their bit positions
//! - [`RuleParser`]: one rule line to a [`ParsedRule`]
//! - [`IntervalMap`] / [`IpIntervalTable`]: non-overlapping range maps
//! - [`AclTable`]: the immutable lookup table built from a rules file
//! - [`IpAllowController`]: publishing, hot reload and retirement of tables
//! - [`IpAllowHandler`]: per-connection checks with statistics
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use r0n_ipallow::ip_allow::{AclTable, MethodRegistry};
//!
//! let registry = Arc::new(MethodRegistry::standard());
//! let table = AclTable::builder(registry)
//!     .build("src_ip=192.168.0.0-192.168.0.255 action=ip_allow method=GET|HEAD\n");
//!
//! assert!(table.is_allowed_method("192.168.0.10".parse().unwrap(), "GET"));
//! assert!(!table.is_allowed_method("192.168.0.10".parse().unwrap(), "POST"));
//! assert!(!table.is_allowed_method("10.0.0.1".parse().unwrap(), "GET"));
//! ```

pub mod diagnostics;
pub mod error;
pub mod handler;
pub mod interval;
pub mod method;
pub mod range;
pub mod reload;
pub mod rule;
pub mod table;
pub mod tokenizer;

pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticSink, Severity, TracingSink};
pub use error::{IpAllowError, IpAllowResult, LineError, LineErrorKind};
pub use handler::{
    AccessCheckResult, CheckContext, DenialReason, IpAllowHandler, IpAllowStats, StatsSnapshot,
};
pub use interval::{Interval, IntervalKey, IntervalMap, IpIntervalTable};
pub use method::{MethodIndex, MethodMask, MethodRegistry, MAX_METHODS, WELL_KNOWN_METHODS};
pub use range::IpRange;
pub use reload::{
    ConfigSource, ControllerOptions, ControllerState, IpAllowController, ReloadOutcome,
    DEFAULT_GRACE_DELAY,
};
pub use rule::{AclAction, AclRecord, ParsedRule, RuleParser};
pub use table::{AclTable, AclTableBuilder, BuildReport, DEFAULT_MODULE_NAME};
