use serde::Serialize;

/// Recoverable problem found while extracting lineage. A run always completes with a
/// (possibly empty) graph and the list of warnings it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    #[error("[line {line}] Syntax error in statement {statement}: {message}")]
    Syntax {
        statement: usize,
        line: u32,
        message: String,
    },
    #[error("[line {line}] Scope error: {message}")]
    Scope { line: u32, message: String },
    #[error("[line {line}] Unresolved column `{column}` in `{node}`: {reason}")]
    UnresolvedColumn {
        line: u32,
        node: String,
        column: String,
        reason: String,
    },
    #[error(
        "[line {line}] `{target}` lists {expected} columns but the query produces {found}, mapping the first {}",
        shorter(.expected, .found)
    )]
    ColumnCountMismatch {
        line: u32,
        target: String,
        expected: usize,
        found: usize,
    },
    #[error(
        "Ambiguous lineage for `{target_node}.{column}` from `{source_node}`: kept `{}`, ignored `{}`",
        derivation_text(.kept),
        derivation_text(.ignored)
    )]
    AmbiguousLineage {
        source_node: String,
        target_node: String,
        column: String,
        kept: Option<String>,
        ignored: Option<String>,
    },
}

fn shorter(expected: &usize, found: &usize) -> usize {
    *expected.min(found)
}

fn derivation_text(derivation: &Option<String>) -> &str {
    derivation.as_deref().unwrap_or("passthrough")
}

/// Input problems that prevent producing any graph.
#[derive(Debug, thiserror::Error)]
pub enum FatalInputError {
    #[error("Cannot read `{path}`: {error}")]
    Unreadable {
        path: String,
        #[source]
        error: std::io::Error,
    },
    #[error("Found empty SQL input.")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_warnings() {
        let warning = Warning::ColumnCountMismatch {
            line: 3,
            target: "dst".to_owned(),
            expected: 2,
            found: 3,
        };
        assert_eq!(
            warning.to_string(),
            "[line 3] `dst` lists 2 columns but the query produces 3, mapping the first 2"
        );

        let warning = Warning::AmbiguousLineage {
            source_node: "a".to_owned(),
            target_node: "b".to_owned(),
            column: "x".to_owned(),
            kept: Some("UPPER(x)".to_owned()),
            ignored: None,
        };
        assert_eq!(
            warning.to_string(),
            "Ambiguous lineage for `b.x` from `a`: kept `UPPER(x)`, ignored `passthrough`"
        );
    }

    #[test]
    fn serializes_warning_kind_tag() {
        let warning = Warning::Scope {
            line: 1,
            message: "oops".to_owned(),
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "scope");
        assert_eq!(json["line"], 1);
    }
}
