//! Sort specification shared by store reads and the grouping cache.
//!
//! The same [`Sort`] renders an `ORDER BY` clause and compares records in
//! memory. Both end with an ascending identity tie-break so the store and
//! the cache always agree on which record comes first.

use std::cmp::Ordering;
use std::fmt;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::filter::value::{self, Scalar};
use crate::model::{Properties, RecordFamily, Thread};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseSensitivity {
    #[default]
    Sensitive,
    Insensitive,
}

/// Field list + direction + case rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    fields: Vec<String>,
    #[serde(default)]
    order: SortOrder,
    #[serde(default)]
    case: CaseSensitivity,
}

impl Default for Sort {
    /// Newest activity first.
    fn default() -> Self {
        Self::new("last_event_timestamp", SortOrder::Descending)
    }
}

impl Sort {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            fields: vec![field.into()],
            order,
            case: CaseSensitivity::Sensitive,
        }
    }

    /// Compound sort: later fields only break ties of earlier ones.
    #[must_use]
    pub const fn by_fields(fields: Vec<String>, order: SortOrder) -> Self {
        Self {
            fields,
            order,
            case: CaseSensitivity::Sensitive,
        }
    }

    #[must_use]
    pub const fn with_case(mut self, case: CaseSensitivity) -> Self {
        self.case = case;
        self
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    #[must_use]
    pub const fn order(&self) -> SortOrder {
        self.order
    }

    #[must_use]
    pub const fn case(&self) -> CaseSensitivity {
        self.case
    }

    #[must_use]
    pub const fn is_ascending(&self) -> bool {
        matches!(self.order, SortOrder::Ascending)
    }

    /// Check every field is a sortable property of `family`.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first unknown field, or if the field list
    /// is empty.
    pub fn validate(&self, family: RecordFamily) -> Result<()> {
        if self.fields.is_empty() {
            bail!("sort has no fields");
        }
        for field in &self.fields {
            if !family.has_property(field) {
                bail!(
                    "unknown sort field '{field}' for {}: expected one of {}",
                    family.table(),
                    family.properties().join(", ")
                );
            }
        }
        Ok(())
    }

    /// Render the `ORDER BY` clause for `family`, including the identity
    /// tie-break. Column names are qualified with `alias`.
    ///
    /// # Errors
    ///
    /// Returns an error if [`Self::validate`] fails.
    pub fn order_by_clause(&self, family: RecordFamily, alias: &str) -> Result<String> {
        self.validate(family)?;

        let direction = if self.is_ascending() { "ASC" } else { "DESC" };
        let collate = match self.case {
            CaseSensitivity::Sensitive => "",
            CaseSensitivity::Insensitive => " COLLATE NOCASE",
        };

        let mut terms: Vec<String> = self
            .fields
            .iter()
            .map(|field| format!("{alias}.{field}{collate} {direction}"))
            .collect();
        terms.extend(
            family
                .identity()
                .iter()
                .map(|column| format!("{alias}.{column} ASC")),
        );

        Ok(format!("ORDER BY {}", terms.join(", ")))
    }

    /// Compare two flattened records. `Ordering::Less` means `a` is listed
    /// before `b`.
    #[must_use]
    pub fn compare(&self, a: &Properties, b: &Properties, family: RecordFamily) -> Ordering {
        for field in &self.fields {
            let ord = value::compare(
                &Scalar::from_property(a.get(field)),
                &Scalar::from_property(b.get(field)),
                self.case,
            );
            let ord = if self.is_ascending() { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }

        for column in family.identity() {
            let ord = value::compare(
                &Scalar::from_property(a.get(*column)),
                &Scalar::from_property(b.get(*column)),
                CaseSensitivity::Sensitive,
            );
            if ord != Ordering::Equal {
                return ord;
            }
        }

        Ordering::Equal
    }

    #[must_use]
    pub fn compare_threads(&self, a: &Thread, b: &Thread) -> Ordering {
        self.compare(&a.properties(), &b.properties(), RecordFamily::Thread)
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = if self.is_ascending() { "asc" } else { "desc" };
        write!(f, "{} {direction}", self.fields.join(","))?;
        if self.case == CaseSensitivity::Insensitive {
            f.write_str(" nocase")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventType;

    fn thread(account: &str, id: &str, last: Option<i64>, count: u64) -> Thread {
        let mut t = Thread::new(EventType::Text, account, id);
        t.last_event_timestamp = last;
        t.count = count;
        t
    }

    #[test]
    fn default_is_newest_first() {
        let sort = Sort::default();
        let old = thread("a", "1", Some(10), 1);
        let new = thread("a", "2", Some(20), 1);
        assert_eq!(sort.compare_threads(&new, &old), Ordering::Less);
        assert!(!sort.is_ascending());
    }

    #[test]
    fn ascending_flips_direction() {
        let sort = Sort::new("last_event_timestamp", SortOrder::Ascending);
        let old = thread("a", "1", Some(10), 1);
        let new = thread("a", "2", Some(20), 1);
        assert_eq!(sort.compare_threads(&old, &new), Ordering::Less);
    }

    #[test]
    fn compound_fields_break_ties_in_order() {
        let sort = Sort::by_fields(
            vec!["last_event_timestamp".into(), "count".into()],
            SortOrder::Descending,
        );
        let few = thread("a", "1", Some(10), 1);
        let many = thread("a", "2", Some(10), 5);
        assert_eq!(sort.compare_threads(&many, &few), Ordering::Less);
    }

    #[test]
    fn identity_breaks_remaining_ties_ascending() {
        let sort = Sort::new("count", SortOrder::Descending);
        let a = thread("acc", "a", None, 1);
        let b = thread("acc", "b", None, 1);
        assert_eq!(sort.compare_threads(&a, &b), Ordering::Less);
        assert_eq!(sort.compare_threads(&b, &a), Ordering::Greater);
        assert_eq!(sort.compare_threads(&a, &a.clone()), Ordering::Equal);
    }

    #[test]
    fn nulls_sort_last_when_descending() {
        let sort = Sort::default();
        let empty = thread("a", "1", None, 0);
        let active = thread("a", "2", Some(1), 1);
        assert_eq!(sort.compare_threads(&active, &empty), Ordering::Less);
    }

    #[test]
    fn order_by_clause_includes_collation_and_identity() {
        let sort = Sort::new("thread_id", SortOrder::Ascending)
            .with_case(CaseSensitivity::Insensitive);
        let clause = sort
            .order_by_clause(RecordFamily::Thread, "t")
            .expect("valid sort");
        assert_eq!(
            clause,
            "ORDER BY t.thread_id COLLATE NOCASE ASC, t.account_id ASC, t.thread_id ASC"
        );
    }

    #[test]
    fn unknown_field_is_rejected() {
        let sort = Sort::new("participants; DROP TABLE threads", SortOrder::Ascending);
        assert!(sort.order_by_clause(RecordFamily::Thread, "t").is_err());
        assert!(Sort::by_fields(Vec::new(), SortOrder::Ascending)
            .validate(RecordFamily::Thread)
            .is_err());
    }

    #[test]
    fn event_sort_uses_event_identity() {
        let clause = Sort::new("timestamp", SortOrder::Descending)
            .order_by_clause(RecordFamily::TextEvent, "e")
            .expect("valid sort");
        assert!(clause.ends_with("e.account_id ASC, e.thread_id ASC, e.event_id ASC"));
    }
}
