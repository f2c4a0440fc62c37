//! Parsing of single `ip_allow` rule lines.
//!
//! A rule line looks like
//!
//! ```text
//! src_ip=10.0.0.1-10.0.0.255 action=ip_deny method=PURGE|PUSH method=DELETE
//! ```
//!
//! `action=ip_allow` permits the listed methods, `action=ip_deny` permits every
//! method except the listed ones. Without any valid `method=` name the rule
//! applies to all methods.

use super::error::{LineError, LineErrorKind};
use super::method::{MethodMask, MethodRegistry};
use super::range::IpRange;
use super::tokenizer::{self, TokenizedLine};

const ACTION_LABEL: &str = "action";
const METHOD_LABEL: &str = "method";
const ALL_METHODS: &str = "ALL";

/// Whether a rule grants or withholds the listed methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AclAction {
    /// `action=ip_allow`.
    Allow,
    /// `action=ip_deny`.
    Deny,
}

impl AclAction {
    /// Parse an `action=` value (case-insensitive).
    #[must_use]
    pub fn from_value(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("ip_allow") {
            Some(Self::Allow)
        } else if value.eq_ignore_ascii_case("ip_deny") {
            Some(Self::Deny)
        } else {
            None
        }
    }

    /// Check if this is an allow action.
    #[must_use]
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Permissions produced by one rule line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AclRecord {
    method_mask: MethodMask,
    source_line: usize,
}

impl AclRecord {
    /// Create a record.
    #[must_use]
    pub const fn new(method_mask: MethodMask, source_line: usize) -> Self {
        Self {
            method_mask,
            source_line,
        }
    }

    /// Methods permitted by this record.
    #[must_use]
    pub const fn method_mask(&self) -> MethodMask {
        self.method_mask
    }

    /// Line of the rules file that produced this record.
    #[must_use]
    pub const fn source_line(&self) -> usize {
        self.source_line
    }

    /// Check if any method of `mask` is permitted.
    #[must_use]
    pub const fn permits(&self, mask: MethodMask) -> bool {
        self.method_mask.bits() & mask.bits() != 0
    }
}

/// A successfully parsed rule line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRule {
    /// Addresses the rule applies to.
    pub range: IpRange,
    /// Action written on the line.
    pub action: AclAction,
    /// Resulting permissions.
    pub record: AclRecord,
    /// Problems that did not invalidate the rule, such as unknown method names.
    pub warnings: Vec<String>,
}

/// Turns rule lines into [`ParsedRule`]s.
#[derive(Debug, Clone, Copy)]
pub struct RuleParser<'a> {
    registry: &'a MethodRegistry,
}

impl<'a> RuleParser<'a> {
    /// Create a parser resolving method names against `registry`.
    #[must_use]
    pub fn new(registry: &'a MethodRegistry) -> Self {
        Self { registry }
    }

    /// Tokenize and parse one non-blank, non-comment line.
    ///
    /// # Errors
    ///
    /// Returns a [`LineError`] describing why the line was rejected.
    pub fn parse_line(&self, line: &str, line_number: usize) -> Result<ParsedRule, LineError> {
        let tokens = tokenizer::tokenize(line).map_err(|kind| LineError::new(line_number, kind))?;
        self.parse_tokens(&tokens, line_number)
    }

    /// Parse an already tokenized line.
    ///
    /// # Errors
    ///
    /// Returns a [`LineError`] for an unparsable address range or a missing action.
    pub fn parse_tokens(
        &self,
        line: &TokenizedLine,
        line_number: usize,
    ) -> Result<ParsedRule, LineError> {
        let fail = |kind| LineError::new(line_number, kind);

        let range: IpRange = line.source.parse().map_err(fail)?;

        // The last recognised action wins; unrecognised values are ignored.
        let action = line
            .values(ACTION_LABEL)
            .filter_map(AclAction::from_value)
            .last()
            .ok_or_else(|| fail(LineErrorKind::MissingAction))?;

        let mut warnings = Vec::new();
        let mut mask = MethodMask::NONE;
        let mut method_found = false;

        for list in line.values(METHOD_LABEL) {
            for name in list.split('|').filter(|n| !n.is_empty()) {
                if name.eq_ignore_ascii_case(ALL_METHODS) {
                    // `ALL` ends this list; a later `method=` token can still
                    // narrow the rule again.
                    method_found = false;
                    break;
                }
                match self.registry.index_of(name) {
                    Some(index) => {
                        method_found = true;
                        mask |= index.mask();
                    },
                    None => warnings.push(format!(
                        "Method name '{name}' on line {line_number} is not valid. Ignoring."
                    )),
                }
            }
        }

        let all = self.registry.all_mask();
        if !method_found {
            mask = all;
        }

        let method_mask = match action {
            AclAction::Allow => mask & all,
            AclAction::Deny => all & !(mask & all),
        };

        Ok(ParsedRule {
            range,
            action,
            record: AclRecord::new(method_mask, line_number),
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<ParsedRule, LineError> {
        let registry = MethodRegistry::standard();
        RuleParser::new(&registry).parse_line(line, 1)
    }

    fn mask(names: &[&str]) -> MethodMask {
        let registry = MethodRegistry::standard();
        names
            .iter()
            .map(|n| registry.index_of(n).unwrap().mask())
            .fold(MethodMask::NONE, |acc, m| acc | m)
    }

    #[test]
    fn test_allow_without_methods_is_all() {
        let rule = parse("src_ip=127.0.0.1 action=ip_allow").unwrap();
        assert_eq!(rule.action, AclAction::Allow);
        assert_eq!(rule.record.method_mask(), MethodMask::ALL);
        assert_eq!(rule.record.source_line(), 1);
        assert!(rule.range.is_single());
    }

    #[test]
    fn test_deny_without_methods_is_none() {
        let rule = parse("src_ip=0.0.0.0-255.255.255.255 action=ip_deny").unwrap();
        assert_eq!(rule.record.method_mask(), MethodMask::NONE);
    }

    #[test]
    fn test_allow_methods() {
        let rule = parse("src_ip=10.0.0.1 action=ip_allow method=GET|HEAD").unwrap();
        assert_eq!(rule.record.method_mask(), mask(&["GET", "HEAD"]));
    }

    #[test]
    fn test_deny_methods_inverts() {
        let rule = parse("src_ip=10.0.0.1 action=ip_deny method=PURGE|PUSH").unwrap();
        let denied = mask(&["PURGE", "PUSH"]);
        assert_eq!(rule.record.method_mask(), MethodMask::ALL & !denied);
        assert!(!rule.record.permits(mask(&["PURGE"])));
        assert!(rule.record.permits(mask(&["GET"])));
    }

    #[test]
    fn test_method_tokens_accumulate() {
        let rule = parse("src_ip=10.0.0.1 action=ip_allow method=GET method=POST").unwrap();
        assert_eq!(rule.record.method_mask(), mask(&["GET", "POST"]));
    }

    #[test]
    fn test_action_after_method() {
        let rule = parse("src_ip=10.0.0.1 method=GET action=ip_allow").unwrap();
        assert_eq!(rule.record.method_mask(), mask(&["GET"]));
    }

    #[test]
    fn test_last_action_wins() {
        let rule = parse("src_ip=10.0.0.1 action=ip_allow action=ip_deny method=GET").unwrap();
        assert_eq!(rule.action, AclAction::Deny);

        let rule = parse("src_ip=10.0.0.1 action=ip_deny action=bogus").unwrap();
        assert_eq!(rule.action, AclAction::Deny);
    }

    #[test]
    fn test_all_in_list_forces_all() {
        let rule = parse("src_ip=10.0.0.1 action=ip_allow method=GET|ALL|POST").unwrap();
        assert_eq!(rule.record.method_mask(), MethodMask::ALL);

        let rule = parse("src_ip=10.0.0.1 action=ip_deny method=GET method=ALL").unwrap();
        assert_eq!(rule.record.method_mask(), MethodMask::NONE);
    }

    #[test]
    fn test_method_after_all_narrows_again() {
        let rule = parse("src_ip=10.0.0.1 action=ip_allow method=GET method=ALL method=POST").unwrap();
        assert_eq!(rule.record.method_mask(), mask(&["GET", "POST"]));
    }

    #[test]
    fn test_unknown_method_is_warning() {
        let rule = parse("src_ip=10.0.0.1 action=ip_allow method=GET|BREW").unwrap();
        assert_eq!(rule.record.method_mask(), mask(&["GET"]));
        assert_eq!(rule.warnings.len(), 1);
        assert!(rule.warnings[0].contains("'BREW'"));
    }

    #[test]
    fn test_only_unknown_methods_defaults_to_all() {
        let rule = parse("src_ip=10.0.0.1 action=ip_allow method=BREW").unwrap();
        assert_eq!(rule.record.method_mask(), MethodMask::ALL);
        assert_eq!(rule.warnings.len(), 1);
    }

    #[test]
    fn test_case_insensitive() {
        let rule = parse("SRC_IP=10.0.0.1 ACTION=IP_ALLOW METHOD=get|all").unwrap();
        assert_eq!(rule.record.method_mask(), MethodMask::ALL);
    }

    #[test]
    fn test_missing_action() {
        let err = parse("src_ip=10.0.0.1 method=GET").unwrap_err();
        assert_eq!(err.kind, LineErrorKind::MissingAction);
        assert_eq!(err.line, 1);

        let err = parse("src_ip=10.0.0.1 action=ip_maybe").unwrap_err();
        assert_eq!(err.kind, LineErrorKind::MissingAction);
    }

    #[test]
    fn test_invalid_address() {
        let err = parse("src_ip=10.0.0.9-10.0.0.1 action=ip_allow").unwrap_err();
        assert!(matches!(err.kind, LineErrorKind::InvalidAddress(_)));

        let err = parse("src_ip=example.com action=ip_allow").unwrap_err();
        assert!(matches!(err.kind, LineErrorKind::InvalidAddress(_)));
    }

    #[test]
    fn test_tokenizer_errors_carry_line_number() {
        let registry = MethodRegistry::standard();
        let err = RuleParser::new(&registry)
            .parse_line("action=ip_allow", 42)
            .unwrap_err();
        assert_eq!(err, LineError::new(42, LineErrorKind::MissingSource));
    }
}
