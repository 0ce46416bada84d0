//! Lexical handling of template markers
//!
//! Supported syntax:
//! - `{{name}}` - substitution marker for a variable
//! - `{{> other}}` - inclusion directive, replaced by another template's content

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Regex to match substitution markers: {{name}} (whitespace inside braces allowed)
static VARIABLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());

/// Regex to match inclusion directives: {{> name_or_id}}
static INCLUDE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*>\s*([^{}\s]+)\s*\}\}").unwrap());

/// Any double-brace block, used to strip markers before looking for stray braces
static DOUBLE_BRACE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{[^{}]*\}\}").unwrap());

/// Single-brace placeholder such as {name}
static SINGLE_BRACE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Names of substitution markers in first-seen order, without duplicates
pub fn extract_variables(content: &str) -> Vec<String> {
    unique_captures(&VARIABLE_PATTERN, content)
}

/// References of inclusion directives in first-seen order, without duplicates
pub fn extract_includes(content: &str) -> Vec<String> {
    unique_captures(&INCLUDE_PATTERN, content)
}

fn unique_captures(pattern: &Regex, content: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();

    for cap in pattern.captures_iter(content) {
        let name = &cap[1];

        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }

    names
}

/// Replace substitution markers with the given text; unknown markers are left as-is
pub fn substitute_variables(content: &str, values: &HashMap<String, String>) -> String {
    VARIABLE_PATTERN
        .replace_all(content, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Replace inclusion directives using a lookup from reference to content
pub fn substitute_includes<'c>(
    content: &str,
    mut lookup: impl FnMut(&str) -> Option<&'c str>,
) -> String {
    INCLUDE_PATTERN
        .replace_all(content, |caps: &Captures| match lookup(&caps[1]) {
            Some(resolved) => resolved.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Non-fatal problem reported by [`lint`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxIssue {
    UnbalancedDoubleBraces { open: usize, close: usize },
    UnbalancedSingleBraces { open: usize, close: usize },
    StrayPlaceholder { name: String },
}

impl fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnbalancedDoubleBraces { open, close } => write!(
                f,
                "Unbalanced double braces: {} '{{{{' vs {} '}}}}'",
                open, close
            ),
            Self::UnbalancedSingleBraces { open, close } => write!(
                f,
                "Unbalanced single braces: {} '{{' vs {} '}}'",
                open, close
            ),
            Self::StrayPlaceholder { name } => write!(
                f,
                "Single-brace placeholder '{{{}}}' will not be substituted, use '{{{{{}}}}}'",
                name, name
            ),
        }
    }
}

/// Lint template content for brace problems
pub fn lint(content: &str) -> Vec<SyntaxIssue> {
    let mut issues = Vec::new();

    let open = content.matches("{{").count();
    let close = content.matches("}}").count();

    if open != close {
        issues.push(SyntaxIssue::UnbalancedDoubleBraces { open, close });
    }

    let remainder = DOUBLE_BRACE_BLOCK.replace_all(content, "");

    for cap in SINGLE_BRACE_PLACEHOLDER.captures_iter(&remainder) {
        issues.push(SyntaxIssue::StrayPlaceholder {
            name: cap[1].to_string(),
        });
    }

    let open = remainder.matches('{').count();
    let close = remainder.matches('}').count();

    if open != close {
        issues.push(SyntaxIssue::UnbalancedSingleBraces { open, close });
    }

    issues
}
