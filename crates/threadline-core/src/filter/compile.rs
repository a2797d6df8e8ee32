//! Predicate → SQL constraint compiler.
//!
//! Values are always bound as parameters; only whitelisted column names are
//! spliced into SQL text. `Contains` patterns escape the wildcard syntax of
//! the operator they are embedded in: `LIKE` (`\`, `%`, `_`, with
//! `ESCAPE '\'`) for case-insensitive tests and `GLOB` (`*`, `?`, `[`) for
//! case-sensitive ones.

use anyhow::{Result, bail};
use rusqlite::types::Value as SqlValue;

use super::value::Scalar;
use super::{Comparison, Predicate};
use crate::model::RecordFamily;
use crate::sort::CaseSensitivity;

/// Result of compiling a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Compiled {
    /// A boolean SQL expression with numbered placeholders
    /// `?{first_param}..`, and the values to bind to them in order.
    Clause { sql: String, params: Vec<SqlValue> },
    /// The predicate can never match: an empty composite, or nothing but
    /// empty standard predicates.
    Nothing,
}

impl Compiled {
    #[must_use]
    pub const fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }
}

enum Fragment {
    Sql(String),
    /// Empty standard predicate: dropped from the enclosing composite.
    Excluded,
    Nothing,
}

/// Compile `predicate` into a constraint over `family`'s table aliased as
/// `alias`. Placeholders are numbered from `first_param` so callers can bind
/// their own parameters before the predicate's.
///
/// # Errors
///
/// Returns an error if a standard predicate names a property the family
/// does not have, compares against a non-scalar value, or applies
/// `Contains` to a non-text value.
pub fn compile(
    predicate: &Predicate,
    family: RecordFamily,
    alias: &str,
    first_param: usize,
) -> Result<Compiled> {
    let mut params = Vec::new();
    match compile_node(predicate, family, alias, first_param, &mut params)? {
        Fragment::Sql(sql) => Ok(Compiled::Clause { sql, params }),
        Fragment::Excluded | Fragment::Nothing => Ok(Compiled::Nothing),
    }
}

fn compile_node(
    predicate: &Predicate,
    family: RecordFamily,
    alias: &str,
    first_param: usize,
    params: &mut Vec<SqlValue>,
) -> Result<Fragment> {
    match predicate {
        Predicate::Standard { .. } if predicate.is_empty_standard() => Ok(Fragment::Excluded),
        Predicate::Standard {
            property,
            value,
            flags,
        } => {
            if !family.has_property(property) {
                bail!(
                    "unknown property '{property}' for {}: expected one of {}",
                    family.table(),
                    family.properties().join(", ")
                );
            }
            let Some(scalar) = Scalar::from_json(value) else {
                bail!("property '{property}' compared against a non-scalar value {value}");
            };
            // Bind the value SQLite would compare after applying the
            // column's affinity, so the in-memory matcher sees the same one.
            let scalar = match family.affinity(property) {
                Some(affinity) => scalar.with_affinity(affinity),
                None => scalar,
            };

            let column = format!("{alias}.{property}");
            let collate = match flags.case {
                CaseSensitivity::Sensitive => "",
                CaseSensitivity::Insensitive => " COLLATE NOCASE",
            };
            let slot = first_param + params.len();

            let sql = match flags.comparison {
                Comparison::Equals => format!("{column} = ?{slot}{collate}"),
                Comparison::NotEquals => format!("{column} <> ?{slot}{collate}"),
                Comparison::LessThan => format!("{column} < ?{slot}{collate}"),
                Comparison::GreaterThan => format!("{column} > ?{slot}{collate}"),
                Comparison::Contains => {
                    let Scalar::Text(needle) = &scalar else {
                        bail!("contains on '{property}' needs a text value, got {value}");
                    };
                    let (sql, pattern) = match flags.case {
                        CaseSensitivity::Sensitive => (
                            format!("{column} GLOB '*' || ?{slot} || '*'"),
                            escape_glob(needle),
                        ),
                        CaseSensitivity::Insensitive => (
                            format!("{column} LIKE '%' || ?{slot} || '%' ESCAPE '\\'"),
                            escape_like(needle),
                        ),
                    };
                    params.push(SqlValue::Text(pattern));
                    return Ok(Fragment::Sql(sql));
                }
            };
            params.push(scalar.into_sql());
            Ok(Fragment::Sql(sql))
        }
        Predicate::Intersection(children) => {
            let mut parts = Vec::with_capacity(children.len());
            for child in children {
                match compile_node(child, family, alias, first_param, params)? {
                    Fragment::Sql(sql) => parts.push(format!("({sql})")),
                    Fragment::Excluded => {}
                    Fragment::Nothing => return Ok(Fragment::Nothing),
                }
            }
            Ok(join(&parts, " AND "))
        }
        Predicate::Union(children) => {
            let mut parts = Vec::with_capacity(children.len());
            for child in children {
                let mark = params.len();
                match compile_node(child, family, alias, first_param, params)? {
                    Fragment::Sql(sql) => parts.push(format!("({sql})")),
                    // A poisoned intersection may have bound values already.
                    Fragment::Excluded | Fragment::Nothing => params.truncate(mark),
                }
            }
            Ok(join(&parts, " OR "))
        }
    }
}

fn join(parts: &[String], separator: &str) -> Fragment {
    if parts.is_empty() {
        Fragment::Nothing
    } else {
        Fragment::Sql(parts.join(separator))
    }
}

/// Escape `LIKE` metacharacters for use with `ESCAPE '\'`.
#[must_use]
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape `GLOB` metacharacters by wrapping them in character classes.
#[must_use]
pub fn escape_glob(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '*' | '?' | '[' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::MatchFlags;
    use crate::model::TextEvent;
    use rusqlite::{Connection, params_from_iter};
    use serde_json::json;

    fn clause(compiled: Compiled) -> (String, Vec<SqlValue>) {
        match compiled {
            Compiled::Clause { sql, params } => (sql, params),
            Compiled::Nothing => panic!("expected a clause"),
        }
    }

    #[test]
    fn standard_defaults_to_case_sensitive_equality() {
        let (sql, params) = clause(
            compile(&Predicate::equals("account_id", "A"), RecordFamily::Thread, "t", 1)
                .expect("compile"),
        );
        assert_eq!(sql, "t.account_id = ?1");
        assert_eq!(params, vec![SqlValue::Text("A".into())]);
    }

    #[test]
    fn intersection_and_union_parenthesize_children() {
        let p = Predicate::and(vec![
            Predicate::equals("account_id", "A"),
            Predicate::or(vec![
                Predicate::equals("thread_id", "T"),
                Predicate::with_flags("count", 2, MatchFlags::new(Comparison::GreaterThan)),
            ]),
        ]);
        let (sql, params) = clause(compile(&p, RecordFamily::Thread, "t", 3).expect("compile"));
        assert_eq!(
            sql,
            "(t.account_id = ?3) AND ((t.thread_id = ?4) OR (t.count > ?5))"
        );
        assert_eq!(params.len(), 3);
        assert_eq!(params[2], SqlValue::Integer(2));
    }

    #[test]
    fn values_are_bound_with_column_affinity() {
        let (_, params) = clause(
            compile(&Predicate::equals("thread_id", 42), RecordFamily::Thread, "t", 1)
                .expect("compile"),
        );
        assert_eq!(params, vec![SqlValue::Text("42".into())]);

        let (_, params) = clause(
            compile(&Predicate::equals("count", "3"), RecordFamily::Thread, "t", 1)
                .expect("compile"),
        );
        assert_eq!(params, vec![SqlValue::Integer(3)]);
    }

    fn compiles_to_nothing(predicate: &Predicate) -> bool {
        compile(predicate, RecordFamily::Thread, "t", 1)
            .expect("compile")
            .is_nothing()
    }

    #[test]
    fn empty_composites_compile_to_nothing() {
        assert!(compiles_to_nothing(&Predicate::and(Vec::new())));
        assert!(compiles_to_nothing(&Predicate::or(Vec::new())));
        let all_empty = Predicate::and(vec![Predicate::equals("", "x")]);
        assert!(compiles_to_nothing(&all_empty));
    }

    #[test]
    fn empty_standard_is_dropped_from_composites() {
        let p = Predicate::and(vec![
            Predicate::equals("thread_id", serde_json::Value::Null),
            Predicate::equals("account_id", "A"),
        ]);
        let (sql, _) = clause(compile(&p, RecordFamily::Thread, "t", 1).expect("compile"));
        assert_eq!(sql, "(t.account_id = ?1)");
        assert!(compiles_to_nothing(&Predicate::equals("", "x")));
    }

    #[test]
    fn nothing_inside_intersection_poisons_it_but_not_union() {
        let and = Predicate::and(vec![
            Predicate::equals("account_id", "A"),
            Predicate::or(Vec::new()),
        ]);
        assert!(compiles_to_nothing(&and));
        let or = Predicate::or(vec![
            Predicate::equals("account_id", "A"),
            Predicate::and(Vec::new()),
        ]);
        let (sql, _) = clause(compile(&or, RecordFamily::Thread, "t", 1).expect("compile"));
        assert_eq!(sql, "(t.account_id = ?1)");

        let nested = Predicate::or(vec![
            Predicate::and(vec![
                Predicate::equals("account_id", "B"),
                Predicate::or(Vec::new()),
            ]),
            Predicate::equals("thread_id", "T"),
        ]);
        let (sql, params) =
            clause(compile(&nested, RecordFamily::Thread, "t", 1).expect("compile"));
        assert_eq!(sql, "(t.thread_id = ?1)");
        assert_eq!(params, vec![SqlValue::Text("T".into())]);
    }

    #[test]
    fn unknown_property_is_an_error() {
        let err = compile(&Predicate::equals("message", "hi"), RecordFamily::Thread, "t", 1)
            .expect_err("threads have no message column");
        assert!(err.to_string().contains("unknown property 'message'"));
        let non_scalar = Predicate::equals("account_id", json!(["A"]));
        assert!(compile(&non_scalar, RecordFamily::Thread, "t", 1).is_err());
    }

    #[test]
    fn like_and_glob_escaping() {
        assert_eq!(escape_like(r"50%_off\now"), r"50\%\_off\\now");
        assert_eq!(escape_glob("a*b?c[d]"), "a[*]b[?]c[[]d]");
        assert_eq!(escape_like("it's"), "it's");
    }

    #[test]
    fn contains_compiles_per_case_rule() {
        let (sql, params) = clause(
            compile(&Predicate::contains("message", "50%"), RecordFamily::TextEvent, "e", 1)
                .expect("compile"),
        );
        assert_eq!(sql, "e.message GLOB '*' || ?1 || '*'");
        assert_eq!(params, vec![SqlValue::Text("50%".into())]);

        let insensitive = Predicate::with_flags(
            "message",
            "50%",
            MatchFlags::new(Comparison::Contains).case_insensitive(),
        );
        let (sql, params) =
            clause(compile(&insensitive, RecordFamily::TextEvent, "e", 1).expect("compile"));
        assert_eq!(sql, "e.message LIKE '%' || ?1 || '%' ESCAPE '\\'");
        assert_eq!(params, vec![SqlValue::Text(r"50\%".into())]);
    }

    /// The compiled constraint and the in-memory matcher must select the
    /// same rows for every non-empty predicate.
    #[test]
    fn compiled_sql_agrees_with_in_memory_matcher() {
        let conn = Connection::open_in_memory().expect("open sqlite");
        conn.execute_batch(
            "CREATE TABLE text_events (
                account_id TEXT, thread_id TEXT, event_id TEXT, sender_id TEXT,
                timestamp INTEGER, new_event INTEGER, message TEXT, message_type INTEGER,
                message_status INTEGER, read_timestamp INTEGER, subject TEXT, sent_time INTEGER
            )",
        )
        .expect("create table");

        let rows = [
            TextEvent::new("A", "T", "1", "self", 10, "Hello world").unread(),
            TextEvent::new("A", "T", "2", "+1555", 20, "50% off_today"),
            TextEvent::new("B", "T", "3", "+1555", 30, "it's [it]?"),
            TextEvent::new("a", "U", "4", "+1555", 40, "HELLO*"),
            TextEvent::new("A", "42", "5", "self", 50, "7"),
        ];
        for e in &rows {
            conn.execute(
                "INSERT INTO text_events VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0, NULL, NULL, NULL)",
                rusqlite::params![
                    e.account_id, e.thread_id, e.event_id, e.sender_id, e.timestamp, e.new_event,
                    e.message
                ],
            )
            .expect("insert row");
        }

        let predicates = [
            Predicate::equals("account_id", "A"),
            Predicate::with_flags("account_id", "a", MatchFlags::default().case_insensitive()),
            Predicate::contains("message", "50%"),
            Predicate::contains("message", "[it]?"),
            Predicate::contains("message", "hello"),
            Predicate::with_flags(
                "message",
                "hello",
                MatchFlags::new(Comparison::Contains).case_insensitive(),
            ),
            Predicate::with_flags("timestamp", 20, MatchFlags::new(Comparison::GreaterThan)),
            Predicate::with_flags("subject", "x", MatchFlags::new(Comparison::NotEquals)),
            Predicate::equals("new_event", true),
            Predicate::equals("thread_id", 42),
            Predicate::equals("thread_id", 42.0),
            Predicate::with_flags("thread_id", 5, MatchFlags::new(Comparison::GreaterThan)),
            Predicate::equals("timestamp", "20"),
            Predicate::equals("timestamp", "2e1"),
            Predicate::with_flags("timestamp", "abc", MatchFlags::new(Comparison::LessThan)),
            Predicate::with_flags("timestamp", "abc", MatchFlags::new(Comparison::GreaterThan)),
            Predicate::contains("timestamp", "0"),
            Predicate::equals("message", 7),
            Predicate::equals("new_event", "1"),
            Predicate::or(vec![
                Predicate::equals("thread_id", "U"),
                Predicate::and(vec![
                    Predicate::equals("account_id", "A"),
                    Predicate::with_flags("timestamp", 15, MatchFlags::new(Comparison::LessThan)),
                ]),
            ]),
        ];

        for predicate in &predicates {
            let (sql, params) = clause(
                compile(predicate, RecordFamily::TextEvent, "e", 1).expect("compile"),
            );
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT e.event_id FROM text_events e WHERE {sql} ORDER BY e.event_id"
                ))
                .expect("prepare");
            let from_sql: Vec<String> = stmt
                .query_map(params_from_iter(params.iter()), |row| row.get(0))
                .expect("query")
                .collect::<rusqlite::Result<_>>()
                .expect("rows");

            let from_memory: Vec<String> = rows
                .iter()
                .filter(|e| predicate.matches(&e.properties()))
                .map(|e| e.event_id.clone())
                .collect();

            assert_eq!(from_sql, from_memory, "disagreement for {predicate:?}");
        }
    }
}
