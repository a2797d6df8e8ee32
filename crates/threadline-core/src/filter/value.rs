//! Scalar view over property values, ordered the way SQLite orders column
//! values so in-memory comparisons agree with the store.

use std::borrow::Cow;
use std::cmp::Ordering;

use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::model::Affinity;
use crate::sort::CaseSensitivity;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Scalar<'a> {
    Null,
    Int(i64),
    Real(f64),
    Text(Cow<'a, str>),
}

impl<'a> Scalar<'a> {
    /// `None` for arrays and objects, which have no column representation.
    pub(crate) fn from_json(value: &'a Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Int(i64::from(*b))),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Real)),
            Value::String(s) => Some(Self::Text(Cow::Borrowed(s))),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Missing properties behave like SQL `NULL`.
    pub(crate) fn from_property(value: Option<&'a Value>) -> Self {
        value.and_then(Self::from_json).unwrap_or(Self::Null)
    }

    pub(crate) fn into_sql(self) -> SqlValue {
        match self {
            Self::Null => SqlValue::Null,
            Self::Int(i) => SqlValue::Integer(i),
            Self::Real(r) => SqlValue::Real(r),
            Self::Text(t) => SqlValue::Text(t.into_owned()),
        }
    }

    /// Convert the way SQLite converts a value compared with a column of
    /// `affinity`: numbers become text for text columns, and text that reads
    /// as a number becomes that number for integer columns.
    pub(crate) fn with_affinity(self, affinity: Affinity) -> Self {
        match (affinity, self) {
            (Affinity::Text, Self::Int(i)) => Self::Text(Cow::Owned(i.to_string())),
            (Affinity::Text, Self::Real(r)) => Self::Text(Cow::Owned(real_to_text(r))),
            (Affinity::Integer, Self::Text(t)) => parse_numeric(&t).unwrap_or(Self::Text(t)),
            (_, other) => other,
        }
    }

    /// The affinity of the column a stored value came from. Record
    /// properties keep their column's storage class, so text values come
    /// from text columns and numbers from integer columns.
    pub(crate) const fn stored_affinity(&self) -> Option<Affinity> {
        match self {
            Self::Null => None,
            Self::Int(_) | Self::Real(_) => Some(Affinity::Integer),
            Self::Text(_) => Some(Affinity::Text),
        }
    }

    /// Text rendering used by `GLOB`/`LIKE` on numeric values.
    pub(crate) fn to_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Null => None,
            Self::Int(i) => Some(Cow::Owned(i.to_string())),
            Self::Real(r) => Some(Cow::Owned(real_to_text(*r))),
            Self::Text(t) => Some(Cow::Borrowed(t.as_ref())),
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Int(_) | Self::Real(_) => 1,
            Self::Text(_) => 2,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(&self) -> f64 {
        match self {
            Self::Int(i) => *i as f64,
            Self::Real(r) => *r,
            Self::Null | Self::Text(_) => 0.0,
        }
    }
}

fn real_to_text(r: f64) -> String {
    if r.is_finite() && r.fract().abs() < f64::EPSILON && r.abs() < 1e15 {
        format!("{r:.1}")
    } else {
        r.to_string()
    }
}

/// SQLite's numeric reading of text: an integer or real literal, optionally
/// padded with spaces. Anything else stays text.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn parse_numeric<'a>(text: &str) -> Option<Scalar<'a>> {
    let trimmed = text.trim_matches(' ');
    let well_formed = trimmed.bytes().any(|b| b.is_ascii_digit())
        && trimmed
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'));
    if !well_formed {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Scalar::Int(i));
    }
    let r = trimmed.parse::<f64>().ok().filter(|r| r.is_finite())?;
    // Integer affinity stores lossless reals as integers.
    if r.fract().abs() < f64::EPSILON && r.abs() < 9.0e15 {
        Some(Scalar::Int(r as i64))
    } else {
        Some(Scalar::Real(r))
    }
}

/// Total order matching SQLite: `NULL` < numbers < text. Text compares
/// bytewise (`BINARY`) or with ASCII case folding (`NOCASE`).
pub(crate) fn compare(a: &Scalar<'_>, b: &Scalar<'_>, case: CaseSensitivity) -> Ordering {
    match (a, b) {
        (Scalar::Int(x), Scalar::Int(y)) => x.cmp(y),
        (Scalar::Text(x), Scalar::Text(y)) => match case {
            CaseSensitivity::Sensitive => x.as_bytes().cmp(y.as_bytes()),
            CaseSensitivity::Insensitive => x
                .bytes()
                .map(|c| c.to_ascii_lowercase())
                .cmp(y.bytes().map(|c| c.to_ascii_lowercase())),
        },
        _ if a.rank() != b.rank() => a.rank().cmp(&b.rank()),
        (Scalar::Null, Scalar::Null) => Ordering::Equal,
        _ => a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn s(value: &Value) -> Scalar<'_> {
        Scalar::from_json(value).expect("scalar")
    }

    #[test]
    fn null_sorts_before_numbers_before_text() {
        let null = json!(null);
        let num = json!(5);
        let text = json!("a");
        let sens = CaseSensitivity::Sensitive;
        assert_eq!(compare(&s(&null), &s(&num), sens), Ordering::Less);
        assert_eq!(compare(&s(&num), &s(&text), sens), Ordering::Less);
        assert_eq!(compare(&s(&text), &s(&null), sens), Ordering::Greater);
    }

    #[test]
    fn mixed_int_and_real_compare_numerically() {
        let int = json!(2);
        let real = json!(2.5);
        assert_eq!(
            compare(&s(&int), &s(&real), CaseSensitivity::Sensitive),
            Ordering::Less
        );
    }

    #[test]
    fn case_folding_is_ascii_only() {
        let upper = json!("ABC");
        let lower = json!("abc");
        assert_eq!(
            compare(&s(&upper), &s(&lower), CaseSensitivity::Insensitive),
            Ordering::Equal
        );
        assert_eq!(
            compare(&s(&upper), &s(&lower), CaseSensitivity::Sensitive),
            Ordering::Less
        );
        let e_upper = json!("É");
        let e_lower = json!("é");
        assert_ne!(
            compare(&s(&e_upper), &s(&e_lower), CaseSensitivity::Insensitive),
            Ordering::Equal
        );
    }

    #[test]
    fn affinity_converts_like_sqlite() {
        assert_eq!(
            Scalar::Int(42).with_affinity(Affinity::Text),
            Scalar::Text(Cow::Borrowed("42"))
        );
        assert_eq!(
            Scalar::Real(2.0).with_affinity(Affinity::Text),
            Scalar::Text(Cow::Borrowed("2.0"))
        );
        assert_eq!(
            Scalar::Text(Cow::Borrowed(" 42 ")).with_affinity(Affinity::Integer),
            Scalar::Int(42)
        );
        assert_eq!(
            Scalar::Text(Cow::Borrowed("2.5")).with_affinity(Affinity::Integer),
            Scalar::Real(2.5)
        );
        assert_eq!(
            Scalar::Text(Cow::Borrowed("3.0")).with_affinity(Affinity::Integer),
            Scalar::Int(3)
        );
        for text in ["abc", "inf", "NaN", "", "4x"] {
            assert_eq!(
                Scalar::Text(Cow::Borrowed(text)).with_affinity(Affinity::Integer),
                Scalar::Text(Cow::Borrowed(text))
            );
        }
        assert_eq!(Scalar::Int(7).with_affinity(Affinity::Integer), Scalar::Int(7));
    }

    #[test]
    fn booleans_are_integers() {
        assert_eq!(Scalar::from_json(&json!(true)), Some(Scalar::Int(1)));
        assert_eq!(Scalar::from_json(&json!([1])), None);
        assert_eq!(Scalar::from_property(None), Scalar::Null);
    }
}
