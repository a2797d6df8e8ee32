//! Identifier normalization and fuzzy participant matching.
//!
//! Phone-like identifiers reduce to an optional leading `+` and their
//! digits. Two phone numbers match when their digit strings are equal or
//! when the shorter one, at least `min_digits` long, is a suffix of the
//! longer (local vs international form). Anything else compares by its
//! trimmed, lowercased form.

/// Default minimum number of trailing digits for a suffix match.
pub const DEFAULT_MIN_MATCH_DIGITS: usize = 7;

const PHONE_PUNCTUATION: &[char] = &[' ', '-', '(', ')', '.', '/'];

/// Whether `identifier` looks like a phone number: digits plus common
/// punctuation, with `+` allowed only in front.
#[must_use]
pub fn is_phone_number(identifier: &str) -> bool {
    let trimmed = identifier.trim();
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    body.chars().any(|c| c.is_ascii_digit())
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || PHONE_PUNCTUATION.contains(&c))
}

/// Canonical form stored as `normalized_identifier`.
#[must_use]
pub fn normalize(identifier: &str) -> String {
    let trimmed = identifier.trim();
    if !is_phone_number(trimmed) {
        return trimmed.to_lowercase();
    }
    let mut out = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        out.push('+');
    }
    out.extend(trimmed.chars().filter(char::is_ascii_digit));
    out
}

fn digits(identifier: &str) -> String {
    identifier.chars().filter(char::is_ascii_digit).collect()
}

/// Compares identifiers under phone-number rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhoneMatcher {
    min_digits: usize,
}

impl Default for PhoneMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_MATCH_DIGITS)
    }
}

impl PhoneMatcher {
    /// `min_digits` of zero is treated as one.
    #[must_use]
    pub fn new(min_digits: usize) -> Self {
        Self {
            min_digits: min_digits.max(1),
        }
    }

    #[must_use]
    pub const fn min_digits(&self) -> usize {
        self.min_digits
    }

    #[must_use]
    pub fn matches(&self, a: &str, b: &str) -> bool {
        if !(is_phone_number(a) && is_phone_number(b)) {
            return normalize(a) == normalize(b);
        }

        let (a, b) = (digits(a), digits(b));
        if a == b {
            return true;
        }
        let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
        shorter.len() >= self.min_digits && longer.ends_with(&shorter)
    }

    /// Greedy one-to-one match of two identifier lists.
    ///
    /// Every entry of `incoming` must consume a distinct matching entry of
    /// `candidate`, and both lists must have the same length. Empty lists
    /// never match.
    #[must_use]
    pub fn participants_match<A, B>(&self, incoming: &[A], candidate: &[B]) -> bool
    where
        A: AsRef<str>,
        B: AsRef<str>,
    {
        if incoming.is_empty() || incoming.len() != candidate.len() {
            return false;
        }

        let mut remaining: Vec<&str> = candidate.iter().map(AsRef::as_ref).collect();
        for id in incoming {
            let id = id.as_ref();
            match remaining.iter().position(|other| self.matches(id, other)) {
                Some(index) => {
                    remaining.swap_remove(index);
                }
                None => return false,
            }
        }
        remaining.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_phone_numbers_keeps_plus_and_digits() {
        assert_eq!(normalize("+1 (555) 010-0100"), "+15550100100");
        assert_eq!(normalize(" 555.0100 "), "5550100");
        assert_eq!(normalize("Alice@Example.org"), "alice@example.org");
    }

    #[test]
    fn plus_in_the_middle_is_not_a_phone_number() {
        assert!(!is_phone_number("555+0100"));
        assert!(!is_phone_number("+"));
        assert!(is_phone_number("+44 20 7946 0000"));
    }

    #[test]
    fn local_number_matches_international_form() {
        let m = PhoneMatcher::default();
        assert!(m.matches("+1-555-0100", "5550100"));
        assert!(m.matches("5550100", "+1-555-0100"));
        assert!(!m.matches("+1-555-0100", "5550101"));
    }

    #[test]
    fn short_suffixes_do_not_match() {
        let m = PhoneMatcher::default();
        assert!(!m.matches("+15550100", "0100"));
        assert!(m.matches("0100", "0100"));
        assert!(PhoneMatcher::new(4).matches("+15550100", "0100"));
    }

    #[test]
    fn non_phone_identifiers_compare_case_insensitively() {
        let m = PhoneMatcher::default();
        assert!(m.matches("Bob@jabber.org", "bob@jabber.org "));
        assert!(!m.matches("bob@jabber.org", "5550100"));
    }

    #[test]
    fn participant_lists_match_one_to_one() {
        let m = PhoneMatcher::default();
        assert!(m.participants_match(&["+1-555-0100", "bob"], &["BOB", "5550100"]));
        assert!(!m.participants_match(&["5550100", "5550100"], &["+15550100", "bob"]));
    }

    #[test]
    fn different_cardinality_never_matches() {
        let m = PhoneMatcher::default();
        assert!(!m.participants_match(&["5550100"], &["5550100", "5550100"]));
        assert!(!m.participants_match::<&str, &str>(&[], &[]));
    }
}
