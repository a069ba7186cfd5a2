//! Located diagnostics for malformed record files

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// A record file that no longer parses, pointing at the offending spot
#[derive(Debug, Error, Diagnostic)]
#[error("malformed record file: {message}")]
#[diagnostic(code(qms::yaml::syntax))]
pub struct YamlSyntaxError {
    #[source_code]
    src: NamedSource<String>,

    #[label("here")]
    span: SourceSpan,

    #[help]
    hint: Option<String>,

    message: String,
}

impl YamlSyntaxError {
    pub fn from_serde_error(err: &serde_yml::Error, source: &str, filename: &str) -> Self {
        let offset = err
            .location()
            .map(|loc| byte_offset(source, loc.line(), loc.column()))
            .unwrap_or(0);
        let message = err.to_string();

        Self {
            src: NamedSource::new(filename, source.to_string()),
            span: SourceSpan::from(offset..offset.saturating_add(1)),
            hint: hint_for(&message),
            message,
        }
    }
}

/// Byte offset of a 1-based line/column pair, clamped to the source
fn byte_offset(source: &str, line: usize, column: usize) -> usize {
    let line_start: usize = source
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    let rest = source.get(line_start..).unwrap_or("");
    let within = rest
        .char_indices()
        .take_while(|(_, c)| *c != '\n')
        .nth(column.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    (line_start + within).min(source.len())
}

const HINTS: &[(&str, &str)] = &[
    ("unknown variant", "Status, severity and type values are lower snake_case, e.g. `in_progress` or `pending_verification`."),
    ("missing field", "Lifecycle fields are written by the CLI; restore the field from version control."),
    ("duplicate key", "Each field may appear once per record."),
    ("tab", "Indent with spaces; YAML rejects tabs."),
    ("mapping values are not allowed", "Quote values that contain ': ', such as free-text remarks."),
    ("premature end", "Timestamps must be RFC 3339, e.g. 2026-03-01T08:00:00Z."),
    ("invalid type", "Measured values are numbers; put free text under `text_value`."),
];

fn hint_for(message: &str) -> Option<String> {
    let lower = message.to_lowercase();
    HINTS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, hint)| (*hint).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_offset() {
        let source = "status: open\nseverity: major\n";
        assert_eq!(byte_offset(source, 1, 1), 0);
        assert_eq!(byte_offset(source, 2, 1), 13);
        assert_eq!(byte_offset(source, 2, 11), 23);
        assert_eq!(byte_offset(source, 9, 1), source.len());
    }

    #[test]
    fn test_hints() {
        assert!(hint_for("status: unknown variant `opened`").unwrap().contains("snake_case"));
        assert!(hint_for("missing field `id`").is_some());
        assert!(hint_for("something else entirely").is_none());
    }

    #[test]
    fn test_parse_str_reports_location() {
        let source = "id: CAPA-1\ntitle: [unclosed\n";
        let err = crate::yaml::parse_str::<serde_json::Value>(source, "CAPA-1.qms.yaml")
            .unwrap_err();
        assert!(err.to_string().starts_with("malformed record file"));
    }
}
