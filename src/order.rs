//! The comparator sub-grammar shared by the ordered condition checks.

use std::cmp::Ordering;

/// A comparison operator that may prefix a condition parameter.
///
/// The two fnmatch operators compare against a shell glob pattern instead of
/// an ordering and are only meaningful to checks that opt into them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOp {
    /// `=$` — matches a shell glob pattern.
    FnmatchEqual,
    /// `!=$` — does not match a shell glob pattern.
    FnmatchUnequal,
    /// `<=`
    LowerOrEqual,
    /// `>=`
    GreaterOrEqual,
    /// `<`
    Lower,
    /// `>`
    Greater,
    /// `=`
    Equal,
    /// `!=`
    Unequal,
}

/// Scanned in order. Some prefixes are prefixes of others, so the longest
/// must come first.
const PREFIXES: &[(&str, OrderOp)] = &[
    ("=$", OrderOp::FnmatchEqual),
    ("!=$", OrderOp::FnmatchUnequal),
    ("<=", OrderOp::LowerOrEqual),
    (">=", OrderOp::GreaterOrEqual),
    ("<", OrderOp::Lower),
    (">", OrderOp::Greater),
    ("=", OrderOp::Equal),
    ("!=", OrderOp::Unequal),
];

impl OrderOp {
    /// Whether this is one of the glob operators (`=$`, `!=$`).
    pub fn is_fnmatch(self) -> bool {
        matches!(self, OrderOp::FnmatchEqual | OrderOp::FnmatchUnequal)
    }

    /// Applies the operator to the result of an ordered comparison.
    ///
    /// # Panics
    ///
    /// Panics when called on a glob operator; those do not define an
    /// ordering and must be handled by the caller before comparing.
    pub fn ordering_matches(self, ordering: Ordering) -> bool {
        match self {
            OrderOp::Lower => ordering.is_lt(),
            OrderOp::LowerOrEqual => ordering.is_le(),
            OrderOp::Equal => ordering.is_eq(),
            OrderOp::Unequal => ordering.is_ne(),
            OrderOp::GreaterOrEqual => ordering.is_ge(),
            OrderOp::Greater => ordering.is_gt(),
            OrderOp::FnmatchEqual | OrderOp::FnmatchUnequal => {
                panic!("glob operators do not define an ordering")
            }
        }
    }
}

/// Scans an [`OrderOp`] prefix off the front of `s`.
///
/// On success the matched prefix is consumed and the cursor advanced. When a
/// glob operator matches but `allow_fnmatch` is false the whole scan fails
/// without consuming anything: `!=$` never degrades to `!=`.
pub fn parse_order(s: &mut &str, allow_fnmatch: bool) -> Option<OrderOp> {
    for &(prefix, op) in PREFIXES {
        if let Some(rest) = s.strip_prefix(prefix) {
            if !allow_fnmatch && op.is_fnmatch() {
                return None;
            }
            *s = rest;
            return Some(op);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(input: &str, allow_fnmatch: bool) -> (Option<OrderOp>, &str) {
        let mut s = input;
        let op = parse_order(&mut s, allow_fnmatch);
        (op, s)
    }

    #[test]
    fn longest_prefix_wins() {
        assert_eq!(scan("<=1", true), (Some(OrderOp::LowerOrEqual), "1"));
        assert_eq!(scan("<1", true), (Some(OrderOp::Lower), "1"));
        assert_eq!(scan(">=1", true), (Some(OrderOp::GreaterOrEqual), "1"));
        assert_eq!(scan(">1", true), (Some(OrderOp::Greater), "1"));
        assert_eq!(scan("=1", true), (Some(OrderOp::Equal), "1"));
        assert_eq!(scan("!=1", true), (Some(OrderOp::Unequal), "1"));
        assert_eq!(scan("=$x*", true), (Some(OrderOp::FnmatchEqual), "x*"));
        assert_eq!(scan("!=$x*", true), (Some(OrderOp::FnmatchUnequal), "x*"));
    }

    #[test]
    fn no_prefix() {
        assert_eq!(scan("1.2.3", true), (None, "1.2.3"));
        assert_eq!(scan("", true), (None, ""));
    }

    #[test]
    fn fnmatch_policy() {
        // With globs disallowed, a glob prefix makes the whole scan fail
        // rather than fall back to a shorter operator.
        assert_eq!(scan("=$x", false), (None, "=$x"));
        assert_eq!(scan("!=$x", false), (None, "!=$x"));
        assert_eq!(scan("=x", false), (Some(OrderOp::Equal), "x"));
        assert_eq!(scan("!=x", false), (Some(OrderOp::Unequal), "x"));
    }

    #[test]
    fn ordering_application() {
        use std::cmp::Ordering::*;
        assert!(OrderOp::Lower.ordering_matches(Less));
        assert!(!OrderOp::Lower.ordering_matches(Equal));
        assert!(OrderOp::LowerOrEqual.ordering_matches(Equal));
        assert!(OrderOp::Equal.ordering_matches(Equal));
        assert!(OrderOp::Unequal.ordering_matches(Greater));
        assert!(OrderOp::GreaterOrEqual.ordering_matches(Greater));
        assert!(!OrderOp::Greater.ordering_matches(Equal));
    }
}
