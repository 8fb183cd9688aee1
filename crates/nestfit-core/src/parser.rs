//! Classification of nested_fit stdout lines.
//!
//! In log-only mode the executable writes `|`-separated lines. The first field
//! carries a marker: `<ERROR>` for errors, `LO` for live progress records.
//! Anything else is noise for our purposes.

/// Separator between fields of one output line.
pub const FIELD_DELIMITER: char = '|';

/// Marker token of an error line.
pub const ERROR_MARKER: &str = "<ERROR>";

/// Marker token of a progress line.
pub const PROGRESS_MARKER: &str = "LO";

/// One progress line, kept as raw fields.
///
/// The executable's progress layout is not fixed here, so no field is given a
/// name or a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    /// The marker field.
    pub tag: String,
    /// Every field after the marker, trimmed.
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// An error reported by the executable, to be echoed verbatim.
    Error(String),
    Progress(ProgressRecord),
    Ignorable,
}

impl ParsedLine {
    pub fn is_error(&self) -> bool {
        matches!(self, ParsedLine::Error(_))
    }
}

/// Classify one line of output. Never fails.
pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut fields = line.split(FIELD_DELIMITER);
    let head = fields.next().unwrap_or_default();

    if head.contains(ERROR_MARKER) {
        return ParsedLine::Error(line.to_string());
    }
    if !head.contains(PROGRESS_MARKER) {
        return ParsedLine::Ignorable;
    }

    ParsedLine::Progress(ProgressRecord {
        tag: head.trim().to_string(),
        fields: fields.map(|f| f.trim().to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_marker_wins() {
        let parsed = parse_line("<ERROR>|LO|could not open data file\n");
        assert_eq!(
            parsed,
            ParsedLine::Error("<ERROR>|LO|could not open data file".to_string())
        );
        assert!(parsed.is_error());
    }

    #[test]
    fn test_unmarked_lines_are_ignorable() {
        assert_eq!(parse_line("Starting nested_fit"), ParsedLine::Ignorable);
        assert_eq!(parse_line(""), ParsedLine::Ignorable);
        assert_eq!(parse_line("\n"), ParsedLine::Ignorable);
    }

    #[test]
    fn test_markers_only_count_in_first_field() {
        assert_eq!(parse_line("INFO|<ERROR>|LO"), ParsedLine::Ignorable);
    }

    #[test]
    fn test_progress_keeps_raw_fields() {
        let parsed = parse_line("LO| 120 | -345.6 |0.01\n");
        assert_eq!(
            parsed,
            ParsedLine::Progress(ProgressRecord {
                tag: "LO".to_string(),
                fields: vec!["120".to_string(), "-345.6".to_string(), "0.01".to_string()],
            })
        );
    }
}
