//! Local filter evaluation.
//!
//! Backends normally evaluate filters themselves; this evaluator exists
//! for the places the engine must test rows in process: static-filter
//! checks during merge, the in-memory connector, and tests.

use crate::record::AttributeValues;
use vdir_proto::{CompareOp, Filter, SimpleFilter, SubstringFilter};

/// Evaluates filters against multi-valued records.
pub struct FilterEvaluator;

impl FilterEvaluator {
    /// Check whether a record satisfies a filter.
    ///
    /// A simple filter matches when any value under the attribute
    /// satisfies the comparison; a missing attribute never matches.
    pub fn matches(filter: &Filter, record: &AttributeValues) -> bool {
        match filter {
            Filter::And(children) => children.iter().all(|c| Self::matches(c, record)),
            Filter::Or(children) => children.iter().any(|c| Self::matches(c, record)),
            Filter::Not(child) => !Self::matches(child, record),
            Filter::Simple(simple) => Self::matches_simple(simple, record),
            Filter::Substring(substring) => Self::matches_substring(substring, record),
        }
    }

    fn matches_simple(filter: &SimpleFilter, record: &AttributeValues) -> bool {
        let Some(values) = record.get(&filter.attribute) else {
            return false;
        };

        if filter.is_presence() {
            return !values.is_empty();
        }

        values.iter().any(|value| match filter.op {
            CompareOp::Eq => value.matches(&filter.value),
            CompareOp::Ne => !value.matches(&filter.value),
            CompareOp::Lt => value
                .compare(&filter.value)
                .is_some_and(|ord| ord.is_lt()),
            CompareOp::Le => value
                .compare(&filter.value)
                .is_some_and(|ord| ord.is_le()),
            CompareOp::Gt => value
                .compare(&filter.value)
                .is_some_and(|ord| ord.is_gt()),
            CompareOp::Ge => value
                .compare(&filter.value)
                .is_some_and(|ord| ord.is_ge()),
        })
    }

    fn matches_substring(filter: &SubstringFilter, record: &AttributeValues) -> bool {
        let Some(values) = record.get(&filter.attribute) else {
            return false;
        };
        values.iter().any(|value| {
            value
                .as_str()
                .is_some_and(|s| wildcard_match(s, &filter.pattern))
        })
    }
}

/// Match a string against a `*` wildcard pattern, case-insensitively.
pub fn wildcard_match(value: &str, pattern: &str) -> bool {
    let value = value.to_ascii_lowercase();
    let pattern = pattern.to_ascii_lowercase();
    wildcard_match_inner(&value, &pattern)
}

fn wildcard_match_inner(value: &str, pattern: &str) -> bool {
    let mut chars = value.chars();
    let mut pattern_chars = pattern.chars();

    loop {
        match pattern_chars.clone().next() {
            None => return chars.next().is_none(),
            Some('*') => {
                pattern_chars.next();
                let rest = pattern_chars.as_str();

                // A trailing star matches everything left.
                if rest.is_empty() {
                    return true;
                }

                // Try consuming zero, one, two, ... characters.
                loop {
                    if wildcard_match_inner(chars.as_str(), rest) {
                        return true;
                    }
                    if chars.next().is_none() {
                        return false;
                    }
                }
            }
            Some(p) => match chars.next() {
                Some(c) if c == p => {
                    pattern_chars.next();
                }
                _ => return false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdir_proto::Value;

    fn record(entries: &[(&str, &[&str])]) -> AttributeValues {
        let mut av = AttributeValues::new();
        for (name, values) in entries {
            av.set(*name, values.iter().map(|v| Value::from(*v)).collect());
        }
        av
    }

    #[test]
    fn equality_any_value() {
        let r = record(&[("cn", &["Alice", "Ally"])]);
        assert!(FilterEvaluator::matches(&Filter::eq("cn", "ally"), &r));
        assert!(!FilterEvaluator::matches(&Filter::eq("cn", "bob"), &r));
    }

    #[test]
    fn missing_attribute_never_matches() {
        let r = record(&[("cn", &["alice"])]);
        assert!(!FilterEvaluator::matches(&Filter::eq("mail", "a@x"), &r));
        assert!(!FilterEvaluator::matches(&Filter::present("mail"), &r));
    }

    #[test]
    fn presence() {
        let r = record(&[("mail", &["a@x"])]);
        assert!(FilterEvaluator::matches(&Filter::present("mail"), &r));
    }

    #[test]
    fn compound_nodes() {
        let r = record(&[("cn", &["alice"]), ("sn", &["smith"])]);

        let and = Filter::And(vec![Filter::eq("cn", "alice"), Filter::eq("sn", "smith")]);
        assert!(FilterEvaluator::matches(&and, &r));

        let or = Filter::Or(vec![Filter::eq("cn", "bob"), Filter::eq("sn", "smith")]);
        assert!(FilterEvaluator::matches(&or, &r));

        let not = Filter::Not(Box::new(Filter::eq("cn", "bob")));
        assert!(FilterEvaluator::matches(&not, &r));
    }

    #[test]
    fn numeric_ordering() {
        let mut r = AttributeValues::new();
        r.add_value("age", Value::Int(30));

        let gt = Filter::Simple(SimpleFilter {
            attribute: "age".into(),
            op: CompareOp::Gt,
            value: Value::Int(18),
        });
        assert!(FilterEvaluator::matches(&gt, &r));

        let lt = Filter::Simple(SimpleFilter {
            attribute: "age".into(),
            op: CompareOp::Lt,
            value: Value::Int(18),
        });
        assert!(!FilterEvaluator::matches(&lt, &r));
    }

    #[test]
    fn substring_patterns() {
        let r = record(&[("mail", &["alice@example.com"])]);
        assert!(FilterEvaluator::matches(
            &Filter::substring("mail", "alice*"),
            &r
        ));
        assert!(FilterEvaluator::matches(
            &Filter::substring("mail", "*@example.com"),
            &r
        ));
        assert!(FilterEvaluator::matches(
            &Filter::substring("mail", "*ice*exam*"),
            &r
        ));
        assert!(!FilterEvaluator::matches(
            &Filter::substring("mail", "bob*"),
            &r
        ));
    }

    #[test]
    fn wildcard_edge_cases() {
        assert!(wildcard_match("anything", "*"));
        assert!(wildcard_match("", "*"));
        assert!(wildcard_match("abc", "abc"));
        assert!(!wildcard_match("abc", "ab"));
        assert!(wildcard_match("AbC", "a*c"));
        assert!(!wildcard_match("", "a"));
    }
}
