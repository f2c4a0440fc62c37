//! Connection-facing access checks with statistics.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use super::error::IpAllowResult;
use super::reload::{IpAllowController, ReloadOutcome};

/// Statistics for the IP allow handler.
#[derive(Debug, Default)]
pub struct IpAllowStats {
    /// Total requests checked.
    pub requests_checked: AtomicU64,
    /// Requests allowed.
    pub requests_allowed: AtomicU64,
    /// Requests denied.
    pub requests_denied: AtomicU64,
    /// Denials because no rule covered the address.
    pub unmatched_denials: AtomicU64,
    /// Denials because the matching rule withholds the method.
    pub method_denials: AtomicU64,
    /// Denials because the method name is not registered.
    pub unknown_method_denials: AtomicU64,
    /// Successful reloads.
    pub reloads: AtomicU64,
    /// Failed reloads.
    pub reload_failures: AtomicU64,
}

impl IpAllowStats {
    /// Create new stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a check result.
    pub fn record_check(&self, reason: DenialReason) {
        self.requests_checked.fetch_add(1, Ordering::Relaxed);
        let counter = match reason {
            DenialReason::None => &self.requests_allowed,
            DenialReason::NoMatchingRule => &self.unmatched_denials,
            DenialReason::MethodNotAllowed => &self.method_denials,
            DenialReason::UnknownMethod => &self.unknown_method_denials,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if reason != DenialReason::None {
            self.requests_denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a reload attempt.
    pub fn record_reload(&self, succeeded: bool) {
        if succeeded {
            self.reloads.fetch_add(1, Ordering::Relaxed);
        } else {
            self.reload_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_checked: self.requests_checked.load(Ordering::Relaxed),
            requests_allowed: self.requests_allowed.load(Ordering::Relaxed),
            requests_denied: self.requests_denied.load(Ordering::Relaxed),
            unmatched_denials: self.unmatched_denials.load(Ordering::Relaxed),
            method_denials: self.method_denials.load(Ordering::Relaxed),
            unknown_method_denials: self.unknown_method_denials.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            reload_failures: self.reload_failures.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`IpAllowStats`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Total requests checked.
    pub requests_checked: u64,
    /// Requests allowed.
    pub requests_allowed: u64,
    /// Requests denied.
    pub requests_denied: u64,
    /// Denials because no rule covered the address.
    pub unmatched_denials: u64,
    /// Denials because the matching rule withholds the method.
    pub method_denials: u64,
    /// Denials because the method name is not registered.
    pub unknown_method_denials: u64,
    /// Successful reloads.
    pub reloads: u64,
    /// Failed reloads.
    pub reload_failures: u64,
}

impl StatsSnapshot {
    /// Format counters in Prometheus text format.
    #[must_use]
    pub fn to_prometheus(&self, prefix: &str) -> String {
        [
            ("requests_checked", self.requests_checked),
            ("requests_allowed", self.requests_allowed),
            ("requests_denied", self.requests_denied),
            ("unmatched_denials", self.unmatched_denials),
            ("method_denials", self.method_denials),
            ("unknown_method_denials", self.unknown_method_denials),
            ("reloads", self.reloads),
            ("reload_failures", self.reload_failures),
        ]
        .iter()
        .map(|(name, value)| format!("{prefix}_{name} {value}\n"))
        .collect()
    }
}

/// Reason for denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// No denial.
    None,
    /// No rule covers the client address.
    NoMatchingRule,
    /// The matching rule does not permit the method.
    MethodNotAllowed,
    /// The method is not in the registry.
    UnknownMethod,
}

/// Result of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessCheckResult {
    /// Whether access is allowed.
    pub allowed: bool,
    /// Denial reason if not allowed.
    pub denial_reason: DenialReason,
    /// Rules file line that decided the check, if a rule matched.
    pub source_line: Option<usize>,
}

impl AccessCheckResult {
    /// Create an allowed result.
    #[must_use]
    pub fn allow(source_line: usize) -> Self {
        Self {
            allowed: true,
            denial_reason: DenialReason::None,
            source_line: Some(source_line),
        }
    }

    /// Create a denied result.
    #[must_use]
    pub fn deny(reason: DenialReason, source_line: Option<usize>) -> Self {
        Self {
            allowed: false,
            denial_reason: reason,
            source_line,
        }
    }
}

/// Context for an access check.
#[derive(Debug, Clone)]
pub struct CheckContext {
    /// Client IP address.
    pub client_ip: IpAddr,
    /// Request method.
    pub method: String,
}

impl CheckContext {
    /// Create a new check context.
    #[must_use]
    pub fn new(client_ip: IpAddr, method: impl Into<String>) -> Self {
        Self {
            client_ip,
            method: method.into(),
        }
    }
}

/// Checks connections against the published ACL table.
#[derive(Debug, Clone)]
pub struct IpAllowHandler {
    controller: Arc<IpAllowController>,
    stats: Arc<IpAllowStats>,
}

impl IpAllowHandler {
    /// Create a handler on top of `controller`.
    #[must_use]
    pub fn new(controller: Arc<IpAllowController>) -> Self {
        Self {
            controller,
            stats: Arc::new(IpAllowStats::new()),
        }
    }

    /// Check if a request is allowed.
    pub fn check_access(&self, context: &CheckContext) -> AccessCheckResult {
        let table = self.controller.load();

        let result = match (
            table.find(context.client_ip),
            table.registry().index_of(&context.method),
        ) {
            (None, _) => AccessCheckResult::deny(DenialReason::NoMatchingRule, None),
            (Some(record), None) => {
                AccessCheckResult::deny(DenialReason::UnknownMethod, Some(record.source_line()))
            },
            (Some(record), Some(index)) if record.permits(index.mask()) => {
                AccessCheckResult::allow(record.source_line())
            },
            (Some(record), Some(_)) => {
                AccessCheckResult::deny(DenialReason::MethodNotAllowed, Some(record.source_line()))
            },
        };

        if !result.allowed {
            debug!(
                client_ip = %context.client_ip,
                method = %context.method,
                reason = ?result.denial_reason,
                line = ?result.source_line,
                "request denied by ip allow table"
            );
        }
        self.stats.record_check(result.denial_reason);
        result
    }

    /// Reload the table, counting the attempt.
    ///
    /// # Errors
    ///
    /// Returns the reload error; the previous table stays published.
    pub fn reload(&self) -> IpAllowResult<ReloadOutcome> {
        let result = self.controller.reload();
        self.stats.record_reload(result.is_ok());
        result
    }

    /// Run [`reload`](Self::reload) on the blocking thread pool.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_reload(&self) -> JoinHandle<IpAllowResult<ReloadOutcome>> {
        let handler = self.clone();
        tokio::task::spawn_blocking(move || handler.reload())
    }

    /// Get statistics.
    #[must_use]
    pub fn stats(&self) -> &IpAllowStats {
        &self.stats
    }

    /// Underlying controller.
    #[must_use]
    pub fn controller(&self) -> &Arc<IpAllowController> {
        &self.controller
    }
}
