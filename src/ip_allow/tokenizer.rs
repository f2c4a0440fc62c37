//! Splitting rule lines into `label=value` tokens.

use super::error::LineErrorKind;

/// Label of the mandatory address specifier.
pub const SOURCE_LABEL: &str = "src_ip";

/// One `label=value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Label, as written.
    pub label: String,
    /// Value with surrounding quotes removed.
    pub value: String,
}

impl Token {
    /// Check the label, ignoring case.
    #[must_use]
    pub fn is(&self, label: &str) -> bool {
        self.label.eq_ignore_ascii_case(label)
    }
}

/// A tokenized rule line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedLine {
    /// Value of the `src_ip` token.
    pub source: String,
    /// Every other token, in line order.
    pub tokens: Vec<Token>,
}

impl TokenizedLine {
    /// Values of all tokens with the given label.
    pub fn values<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tokens
            .iter()
            .filter(move |t| t.is(label))
            .map(|t| t.value.as_str())
    }
}

/// Returns `true` for lines that carry no rule.
#[must_use]
pub fn is_skippable(line: &str) -> bool {
    let line = line.trim_start();
    line.is_empty() || line.starts_with('#')
}

/// Tokenize one non-blank, non-comment rule line.
///
/// # Errors
///
/// Returns the reason the line cannot be tokenized.
pub fn tokenize(line: &str) -> Result<TokenizedLine, LineErrorKind> {
    let mut source = None;
    let mut tokens = Vec::new();

    for raw in split_words(line)? {
        let (label, value) = raw
            .split_once('=')
            .ok_or_else(|| LineErrorKind::Malformed(format!("expected label=value, got '{raw}'")))?;
        let label = label.trim();
        let value = unquote(value.trim());

        if label.is_empty() {
            return Err(LineErrorKind::Malformed(format!("missing label in '{raw}'")));
        }
        if value.is_empty() {
            return Err(LineErrorKind::Malformed(format!("missing value for '{label}'")));
        }

        if label.eq_ignore_ascii_case(SOURCE_LABEL) {
            if source.is_some() {
                return Err(LineErrorKind::MultipleSources);
            }
            source = Some(value.to_string());
        } else {
            tokens.push(Token {
                label: label.to_string(),
                value: value.to_string(),
            });
        }
    }

    let source = source.ok_or(LineErrorKind::MissingSource)?;
    Ok(TokenizedLine { source, tokens })
}

/// Split on whitespace, keeping double-quoted runs together.
fn split_words(line: &str) -> Result<Vec<&str>, LineErrorKind> {
    let mut words = Vec::new();
    let mut start = None;
    let mut in_quotes = false;

    for (i, c) in line.char_indices() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                start.get_or_insert(i);
            },
            c if c.is_whitespace() && !in_quotes => {
                if let Some(s) = start.take() {
                    words.push(&line[s..i]);
                }
            },
            _ => {
                start.get_or_insert(i);
            },
        }
    }

    if in_quotes {
        return Err(LineErrorKind::Malformed("unterminated quote".to_string()));
    }
    if let Some(s) = start {
        words.push(&line[s..]);
    }
    Ok(words)
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skippable_lines() {
        assert!(is_skippable(""));
        assert!(is_skippable("   \t"));
        assert!(is_skippable("# comment"));
        assert!(is_skippable("   # indented comment"));
        assert!(!is_skippable("src_ip=1.2.3.4 action=ip_allow"));
    }

    #[test]
    fn test_tokenize_basic() {
        let line = tokenize("src_ip=10.0.0.1-10.0.0.9 action=ip_deny method=GET|POST").unwrap();
        assert_eq!(line.source, "10.0.0.1-10.0.0.9");
        assert_eq!(line.tokens.len(), 2);
        assert_eq!(line.values("action").collect::<Vec<_>>(), vec!["ip_deny"]);
        assert_eq!(line.values("METHOD").collect::<Vec<_>>(), vec!["GET|POST"]);
    }

    #[test]
    fn test_tokenize_any_order_and_case() {
        let line = tokenize("Action=ip_allow  SRC_IP=::1\tmethod=GET method=HEAD").unwrap();
        assert_eq!(line.source, "::1");
        assert_eq!(line.values("method").collect::<Vec<_>>(), vec!["GET", "HEAD"]);
    }

    #[test]
    fn test_tokenize_quoted_value() {
        let line = tokenize(r#"src_ip="127.0.0.1" action="ip_allow" method="GET|HEAD""#).unwrap();
        assert_eq!(line.source, "127.0.0.1");
        assert_eq!(line.values("method").next(), Some("GET|HEAD"));
    }

    #[test]
    fn test_tokenize_errors() {
        assert!(matches!(tokenize("src_ip=1.2.3.4 ip_allow"), Err(LineErrorKind::Malformed(_))));
        assert!(matches!(tokenize("src_ip= action=ip_allow"), Err(LineErrorKind::Malformed(_))));
        assert!(matches!(tokenize("=1.2.3.4"), Err(LineErrorKind::Malformed(_))));
        assert!(matches!(tokenize(r#"src_ip="1.2.3.4"#), Err(LineErrorKind::Malformed(_))));
        assert_eq!(tokenize("action=ip_allow"), Err(LineErrorKind::MissingSource));
        assert_eq!(
            tokenize("src_ip=1.1.1.1 src_ip=2.2.2.2 action=ip_allow"),
            Err(LineErrorKind::MultipleSources)
        );
    }
}
