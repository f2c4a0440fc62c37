//! Immutable ACL tables.
//!
//! A table is built in one pass over the rules text: every accepted line
//! appends an [`AclRecord`] and fills its address range with the record's
//! index. Later lines overwrite earlier ones where ranges overlap. Once built
//! the table is never mutated, so any number of threads can look up in it
//! without locking.

use std::fmt::Write as _;
use std::net::IpAddr;
use std::sync::Arc;

use tracing::debug;

use super::diagnostics::{Diagnostic, DiagnosticSink};
use super::interval::IpIntervalTable;
use super::method::{MethodIndex, MethodRegistry};
use super::range::IpRange;
use super::rule::{AclRecord, RuleParser};
use super::tokenizer;

/// Default module name used in diagnostics.
pub const DEFAULT_MODULE_NAME: &str = "IpAllow";

/// Counters collected while building a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Rule lines examined (blank and comment lines excluded).
    pub lines: usize,
    /// Lines turned into records.
    pub accepted: usize,
    /// Lines discarded.
    pub rejected: usize,
    /// Unknown method names skipped.
    pub warnings: usize,
}

/// An immutable IP access control table.
#[derive(Debug)]
pub struct AclTable {
    records: Box<[AclRecord]>,
    map: IpIntervalTable<usize>,
    registry: Arc<MethodRegistry>,
    source: String,
    report: BuildReport,
}

impl AclTable {
    /// Start building a table that resolves methods against `registry`.
    #[must_use]
    pub fn builder(registry: Arc<MethodRegistry>) -> AclTableBuilder {
        AclTableBuilder::new(registry)
    }

    /// A table that matches nothing.
    #[must_use]
    pub fn empty(registry: Arc<MethodRegistry>) -> Self {
        Self {
            records: Box::new([]),
            map: IpIntervalTable::new(),
            registry,
            source: String::new(),
            report: BuildReport::default(),
        }
    }

    /// Record governing `addr`, if any rule covers it.
    #[must_use]
    pub fn find(&self, addr: IpAddr) -> Option<&AclRecord> {
        self.map.find(addr).and_then(|&index| self.records.get(index))
    }

    /// Check if `addr` may issue the method at `method`.
    ///
    /// Addresses no rule covers are denied.
    #[must_use]
    pub fn is_allowed(&self, addr: IpAddr, method: MethodIndex) -> bool {
        self.find(addr)
            .is_some_and(|record| record.permits(self.registry.mask_of(method)))
    }

    /// Check if `addr` may issue the method named `method`.
    ///
    /// Unknown method names are denied.
    #[must_use]
    pub fn is_allowed_method(&self, addr: IpAddr, method: &str) -> bool {
        self.registry
            .index_of(method)
            .is_some_and(|index| self.is_allowed(addr, index))
    }

    /// Entries in ascending address order with their records.
    pub fn entries(&self) -> impl Iterator<Item = (IpRange, &AclRecord)> + '_ {
        self.map
            .iter()
            .filter_map(|(range, &index)| self.records.get(index).map(|record| (range, record)))
    }

    /// All records, in rules-file order.
    #[must_use]
    pub fn records(&self) -> &[AclRecord] {
        &self.records
    }

    /// Number of address ranges in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the table matches no address at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Registry used to resolve method names.
    #[must_use]
    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }

    /// Name of the rules source, usually the file path.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Counters from the build.
    #[must_use]
    pub fn report(&self) -> BuildReport {
        self.report
    }

    /// Human-readable dump of every entry.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = format!("{} ACL entries.", self.len());
        for (range, record) in self.entries() {
            let _ = write!(
                out,
                "\n  Line {}: {} method={}",
                record.source_line(),
                range,
                self.registry.format_mask(record.method_mask())
            );
        }
        out
    }
}

/// Builds an [`AclTable`] from rules text.
pub struct AclTableBuilder {
    registry: Arc<MethodRegistry>,
    module_name: String,
    source: String,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl std::fmt::Debug for AclTableBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AclTableBuilder")
            .field("module_name", &self.module_name)
            .field("source", &self.source)
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl AclTableBuilder {
    /// Create a builder.
    #[must_use]
    pub fn new(registry: Arc<MethodRegistry>) -> Self {
        Self {
            registry,
            module_name: DEFAULT_MODULE_NAME.to_string(),
            source: String::new(),
            sink: None,
        }
    }

    /// Set the module name shown in diagnostics.
    #[must_use]
    pub fn module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }

    /// Set the source name (file path) shown in diagnostics.
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Send diagnostics to `sink`.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build a table from the full rules text.
    ///
    /// Bad lines are reported and skipped. A text without any usable rule
    /// yields a table that denies every address.
    #[must_use]
    pub fn build(&self, text: &str) -> AclTable {
        let parser = RuleParser::new(&self.registry);
        let mut records = Vec::new();
        let mut map = IpIntervalTable::new();
        let mut report = BuildReport::default();
        let mut alarm_raised = false;

        for (line_number, line) in text.lines().enumerate().map(|(i, l)| (i + 1, l)) {
            if tokenizer::is_skippable(line) {
                continue;
            }
            report.lines += 1;

            match parser.parse_line(line, line_number) {
                Ok(rule) => {
                    for warning in rule.warnings {
                        report.warnings += 1;
                        self.report(Diagnostic::warning(Some(line_number), warning));
                    }
                    map.fill(&rule.range, records.len());
                    records.push(rule.record);
                    report.accepted += 1;
                },
                Err(err) => {
                    report.rejected += 1;
                    let message = format!(
                        "{} discarding {} entry at line {} : {}",
                        self.module_name, self.source, err.line, err.kind
                    );
                    if alarm_raised {
                        self.report(Diagnostic::error(Some(line_number), message));
                    } else {
                        alarm_raised = true;
                        self.report(Diagnostic::alarm(Some(line_number), message));
                    }
                },
            }
        }

        if map.is_empty() {
            self.report(Diagnostic::warning(
                None,
                format!(
                    "{} No entries in {}. All IP Addresses will be blocked",
                    self.module_name, self.source
                ),
            ));
        }
        map.shrink_to_fit();

        let table = AclTable {
            records: records.into_boxed_slice(),
            map,
            registry: Arc::clone(&self.registry),
            source: self.source.clone(),
            report,
        };

        debug!(
            source = %table.source,
            entries = table.len(),
            accepted = report.accepted,
            rejected = report.rejected,
            "ACL table built"
        );
        debug!("{}", table.describe());

        table
    }

    fn report(&self, diagnostic: Diagnostic) {
        if let Some(sink) = &self.sink {
            sink.report(diagnostic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip_allow::diagnostics::{CollectingSink, Severity};

    fn registry() -> Arc<MethodRegistry> {
        Arc::new(MethodRegistry::standard())
    }

    fn build(text: &str) -> AclTable {
        AclTable::builder(registry()).source("ip_allow.config").build(text)
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_build_and_lookup() {
        let table = build(
            "# localhost may do anything\n\
             src_ip=127.0.0.1 action=ip_allow\n\
             \n\
             src_ip=10.0.0.0-10.0.0.255 action=ip_allow method=GET|HEAD\n",
        );

        assert_eq!(table.len(), 2);
        assert_eq!(table.records().len(), 2);
        assert!(table.is_allowed_method(ip("127.0.0.1"), "PURGE"));
        assert!(table.is_allowed_method(ip("10.0.0.9"), "GET"));
        assert!(!table.is_allowed_method(ip("10.0.0.9"), "POST"));
        assert!(!table.is_allowed_method(ip("10.0.1.0"), "GET"));
    }

    #[test]
    fn test_later_rules_override_earlier() {
        let table = build(
            "src_ip=1.0.0.0-1.0.0.255 action=ip_allow\n\
             src_ip=1.0.0.10 action=ip_deny method=GET\n",
        );

        assert!(!table.is_allowed_method(ip("1.0.0.10"), "GET"));
        assert!(table.is_allowed_method(ip("1.0.0.10"), "POST"));
        assert!(table.is_allowed_method(ip("1.0.0.20"), "GET"));
        assert!(table.is_allowed_method(ip("1.0.0.9"), "GET"));
        assert_eq!(table.find(ip("1.0.0.10")).unwrap().source_line(), 2);
        assert_eq!(table.find(ip("1.0.0.11")).unwrap().source_line(), 1);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_unknown_method_name_denied() {
        let table = build("src_ip=10.0.0.1 action=ip_allow\n");
        assert!(!table.is_allowed_method(ip("10.0.0.1"), "BREW"));
    }

    #[test]
    fn test_bad_lines_are_skipped() {
        let sink = Arc::new(CollectingSink::new());
        let table = AclTable::builder(registry())
            .module_name("IpAllow")
            .source("/etc/r0n/ip_allow.config")
            .sink(sink.clone())
            .build(
                "src_ip=10.0.0.1 method=GET\n\
                 src_ip=10.0.0.2 action=ip_allow\n\
                 src_ip=bogus action=ip_allow\n\
                 src_ip=10.0.0.3 action=ip_allow method=BREW|GET\n",
            );

        assert_eq!(table.len(), 2);
        assert_eq!(
            table.report(),
            BuildReport {
                lines: 4,
                accepted: 2,
                rejected: 2,
                warnings: 1,
            }
        );

        let diagnostics = sink.diagnostics();
        assert_eq!(diagnostics.len(), 3);
        assert_eq!(diagnostics[0].severity, Severity::Alarm);
        assert_eq!(
            diagnostics[0].message,
            "IpAllow discarding /etc/r0n/ip_allow.config entry at line 1 : Invalid action/method specified"
        );
        assert_eq!(diagnostics[1].severity, Severity::Error);
        assert_eq!(diagnostics[1].line, Some(3));
        assert_eq!(diagnostics[2].severity, Severity::Warning);
        assert_eq!(diagnostics[2].line, Some(4));
    }

    #[test]
    fn test_empty_table_denies_everything() {
        let sink = Arc::new(CollectingSink::new());
        let table = AclTable::builder(registry())
            .source("ip_allow.config")
            .sink(sink.clone())
            .build("# nothing here\n\nsrc_ip=oops action=ip_allow\n");

        assert!(table.is_empty());
        assert!(!table.is_allowed_method(ip("127.0.0.1"), "GET"));
        assert!(!table.is_allowed_method(ip("::1"), "GET"));

        let last = sink.diagnostics().pop().unwrap();
        assert_eq!(last.severity, Severity::Warning);
        assert_eq!(
            last.message,
            "IpAllow No entries in ip_allow.config. All IP Addresses will be blocked"
        );
    }

    #[test]
    fn test_describe() {
        let table = build(
            "src_ip=1.0.0.0-1.0.0.255 action=ip_allow\n\
             src_ip=1.0.0.10 action=ip_deny method=GET\n\
             src_ip=::1 action=ip_allow method=GET|HEAD\n\
             src_ip=2.0.0.1 action=ip_deny\n",
        );

        let get = table.registry().index_of("GET").unwrap();
        let all_but_get = table
            .registry()
            .format_mask(table.registry().all_mask() & !get.mask());

        let expected = format!(
            "5 ACL entries.\n  \
             Line 1: 1.0.0.0 - 1.0.0.9 method=ALL\n  \
             Line 2: 1.0.0.10 method={all_but_get}\n  \
             Line 1: 1.0.0.11 - 1.0.0.255 method=ALL\n  \
             Line 4: 2.0.0.1 method=NONE\n  \
             Line 3: ::1 method=GET|HEAD"
        );
        assert_eq!(table.describe(), expected);
        assert_eq!(table.describe(), table.describe());
    }

    #[test]
    fn test_empty_constructor() {
        let table = AclTable::empty(registry());
        assert!(table.is_empty());
        assert_eq!(table.describe(), "0 ACL entries.");
    }

    #[test]
    fn test_ipv6_families_stay_apart() {
        let table = build(
            "src_ip=2001:db8::-2001:db8::ffff action=ip_allow method=GET\n\
             src_ip=192.0.2.1 action=ip_allow\n\
             src_ip=::ffff:198.51.100.0-::ffff:198.51.100.255 action=ip_allow\n",
        );
        assert!(table.is_allowed_method(ip("2001:db8::10"), "GET"));
        assert!(!table.is_allowed_method(ip("2001:db8::10"), "POST"));
        assert!(table.is_allowed_method(ip("192.0.2.1"), "POST"));
        assert!(!table.is_allowed_method(ip("::ffff:192.0.2.1"), "POST"));
        assert!(table.is_allowed_method(ip("::ffff:198.51.100.7"), "POST"));
        assert!(!table.is_allowed_method(ip("198.51.100.7"), "POST"));
        assert_eq!(table.entries().count(), table.len());
    }
}
