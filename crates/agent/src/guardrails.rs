use funnelsight_core::warehouse::WarehouseError;

/// Keywords that mutate data or schema, matched as whole words outside
/// string literals and comments.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "drop", "delete", "truncate", "alter", "create", "insert", "update", "merge", "grant",
    "revoke", "attach", "detach", "pragma", "vacuum", "replace",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    /// Carries the statement with comments and the trailing `;` removed.
    Allow { statement: String },
    Deny { reason_code: &'static str, user_message: String },
}

impl GuardrailDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// Read-only gate in front of the warehouse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryGuard {
    table: String,
}

impl QueryGuard {
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into() }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn evaluate(&self, sql: &str) -> GuardrailDecision {
        let scanned = match scan(sql) {
            Ok(scanned) => scanned,
            Err(reason) => {
                return GuardrailDecision::Deny {
                    reason_code: "unterminated_literal",
                    user_message: reason.to_string(),
                }
            }
        };

        let statement = scanned.statement.trim().trim_end_matches(';').trim().to_string();
        if statement.is_empty() {
            return GuardrailDecision::Deny {
                reason_code: "empty_statement",
                user_message: "The query is empty.".to_string(),
            };
        }

        let words = scanned.words;
        if words.len() > 1 || scanned.separators > 1 || has_inner_separator(&statement) {
            return GuardrailDecision::Deny {
                reason_code: "multiple_statements",
                user_message: "Only a single statement may be executed.".to_string(),
            };
        }
        let words = words.into_iter().next().unwrap_or_default();

        match words.first().map(String::as_str) {
            Some("select") | Some("with") => {}
            _ => {
                return GuardrailDecision::Deny {
                    reason_code: "not_a_read",
                    user_message: "Only SELECT or WITH queries are allowed.".to_string(),
                }
            }
        }

        if let Some(keyword) =
            words.iter().find(|word| FORBIDDEN_KEYWORDS.contains(&word.as_str()))
        {
            return GuardrailDecision::Deny {
                reason_code: "forbidden_keyword",
                user_message: format!("The query contains the forbidden keyword `{keyword}`."),
            };
        }

        let table = self.table.to_ascii_lowercase();
        if !words.iter().any(|word| *word == table || word.ends_with(&format!(".{table}"))) {
            return GuardrailDecision::Deny {
                reason_code: "unknown_table",
                user_message: format!("Queries must read from `{}`.", self.table),
            };
        }

        GuardrailDecision::Allow { statement }
    }

    /// [`QueryGuard::evaluate`] as a `Result`, for callers that propagate.
    pub fn check(&self, sql: &str) -> Result<String, WarehouseError> {
        match self.evaluate(sql) {
            GuardrailDecision::Allow { statement } => Ok(statement),
            GuardrailDecision::Deny { user_message, .. } => {
                Err(WarehouseError::Rejected(user_message))
            }
        }
    }
}

struct Scanned {
    /// Source with comments blanked out, literals kept.
    statement: String,
    /// Lower-cased identifier words per `;`-separated segment.
    words: Vec<Vec<String>>,
    separators: usize,
}

/// Splits the source into words outside literals and comments, counting `;`.
fn scan(sql: &str) -> Result<Scanned, &'static str> {
    let mut statement = String::with_capacity(sql.len());
    let mut segments: Vec<Vec<String>> = vec![Vec::new()];
    let mut separators = 0;
    let mut word = String::new();
    let mut chars = sql.chars().peekable();

    let flush = |word: &mut String, segments: &mut Vec<Vec<String>>| {
        if !word.is_empty() {
            if let Some(segment) = segments.last_mut() {
                segment.push(word.to_ascii_lowercase());
            }
            word.clear();
        }
    };

    while let Some(ch) = chars.next() {
        match ch {
            '\'' | '"' | '`' => {
                flush(&mut word, &mut segments);
                statement.push(ch);
                let mut closed = false;
                for inner in chars.by_ref() {
                    statement.push(inner);
                    if inner == ch {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err("The query has an unterminated quoted literal.");
                }
                // Quoted identifiers still name tables.
                if ch != '\'' {
                    let quoted = statement
                        .rsplit(ch)
                        .nth(1)
                        .map(|name| name.to_ascii_lowercase())
                        .unwrap_or_default();
                    if let Some(segment) = segments.last_mut() {
                        segment.push(quoted);
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                flush(&mut word, &mut segments);
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
                statement.push(' ');
            }
            '/' if chars.peek() == Some(&'*') => {
                flush(&mut word, &mut segments);
                chars.next();
                let mut previous = '\0';
                for inner in chars.by_ref() {
                    if previous == '*' && inner == '/' {
                        break;
                    }
                    previous = inner;
                }
                statement.push(' ');
            }
            ';' => {
                flush(&mut word, &mut segments);
                separators += 1;
                statement.push(ch);
                segments.push(Vec::new());
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' => {
                word.push(c);
                statement.push(c);
            }
            c => {
                flush(&mut word, &mut segments);
                statement.push(c);
            }
        }
    }
    flush(&mut word, &mut segments);

    let words = segments.into_iter().filter(|segment| !segment.is_empty()).collect();
    Ok(Scanned { statement, words, separators })
}

/// A `;` that survives trimming the tail sits between two statements.
fn has_inner_separator(statement: &str) -> bool {
    let mut in_literal: Option<char> = None;
    for ch in statement.chars() {
        match (in_literal, ch) {
            (Some(open), c) if c == open => in_literal = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => in_literal = Some(ch),
            (None, ';') => return true,
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use funnelsight_core::warehouse::WarehouseError;

    use super::{GuardrailDecision, QueryGuard};

    fn guard() -> QueryGuard {
        QueryGuard::new("funnels_resumido")
    }

    fn reason(decision: GuardrailDecision) -> &'static str {
        match decision {
            GuardrailDecision::Deny { reason_code, .. } => reason_code,
            GuardrailDecision::Allow { .. } => "allowed",
        }
    }

    #[test]
    fn plain_selects_are_allowed_and_normalized() {
        let decision = guard().evaluate(
            "SELECT culture, SUM(traffic) FROM funnels_resumido WHERE culture = 'CL' GROUP BY culture;",
        );
        assert_eq!(
            decision,
            GuardrailDecision::Allow {
                statement: "SELECT culture, SUM(traffic) FROM funnels_resumido WHERE culture = 'CL' GROUP BY culture"
                    .to_string()
            }
        );
    }

    #[test]
    fn common_table_expressions_are_allowed() {
        let decision = guard().evaluate(
            "WITH daily AS (SELECT date, SUM(traffic) AS t FROM funnels_resumido GROUP BY date) \
             SELECT * FROM daily",
        );
        assert!(decision.is_allowed());
    }

    #[test]
    fn mutations_are_denied() {
        assert_eq!(reason(guard().evaluate("DELETE FROM funnels_resumido")), "not_a_read");
        assert_eq!(
            reason(guard().evaluate("SELECT * FROM funnels_resumido; DROP TABLE funnels_resumido")),
            "multiple_statements"
        );
        assert_eq!(
            reason(guard().evaluate(
                "WITH x AS (DELETE FROM funnels_resumido RETURNING *) SELECT * FROM x"
            )),
            "forbidden_keyword"
        );
    }

    #[test]
    fn keywords_inside_literals_and_identifiers_are_ignored() {
        assert!(guard()
            .evaluate("SELECT * FROM funnels_resumido WHERE traffic_type = 'drop; delete'")
            .is_allowed());
        assert!(guard().evaluate("SELECT created_at_day FROM funnels_resumido").is_allowed());
    }

    #[test]
    fn comments_cannot_hide_keywords_or_statements() {
        assert!(guard()
            .evaluate("SELECT * FROM funnels_resumido -- drop everything\n WHERE culture = 'CL'")
            .is_allowed());
        assert_eq!(
            reason(guard().evaluate("SELECT * FROM funnels_resumido /* x */; UPDATE t SET a = 1")),
            "multiple_statements"
        );
    }

    #[test]
    fn other_tables_are_denied() {
        assert_eq!(reason(guard().evaluate("SELECT * FROM sqlite_master")), "unknown_table");
        assert!(guard().evaluate("SELECT * FROM main.funnels_resumido").is_allowed());
        assert!(guard().evaluate("SELECT * FROM \"funnels_resumido\"").is_allowed());
    }

    #[test]
    fn check_maps_denials_to_rejections() {
        assert!(matches!(guard().check(""), Err(WarehouseError::Rejected(_))));
        assert!(matches!(guard().check("SELECT 'open FROM funnels_resumido"), Err(_)));
        assert!(guard().check("select 1 from funnels_resumido").is_ok());
    }
}
