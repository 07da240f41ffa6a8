//! Row joining.
//!
//! Joins operate on `alias.field`-keyed records. A relationship holds
//! when any value pair across its two field references satisfies the
//! comparison; an edge holds when all of its relationships do.

use crate::mapping::{FieldRef, Relationship};
use crate::record::AttributeValues;
use vdir_proto::{append_and, append_or, CompareOp, Filter, SimpleFilter, Value};

fn satisfies(op: CompareOp, left: &Value, right: &Value) -> bool {
    match op {
        CompareOp::Eq => left.matches(right),
        CompareOp::Ne => !left.matches(right),
        CompareOp::Lt => left.compare(right).is_some_and(|o| o.is_lt()),
        CompareOp::Le => left.compare(right).is_some_and(|o| o.is_le()),
        CompareOp::Gt => left.compare(right).is_some_and(|o| o.is_gt()),
        CompareOp::Ge => left.compare(right).is_some_and(|o| o.is_ge()),
    }
}

fn side_values<'a>(
    reference: &FieldRef,
    a: &'a AttributeValues,
    b: &'a AttributeValues,
) -> Option<&'a [Value]> {
    let key = reference.qualified();
    a.get(&key).or_else(|| b.get(&key))
}

/// Check whether two records satisfy every relationship of an edge.
///
/// Either record may hold either side's values; a side with no values
/// fails the relationship.
pub fn evaluate(relationships: &[Relationship], a: &AttributeValues, b: &AttributeValues) -> bool {
    relationships.iter().all(|rel| {
        let Some(lhs) = side_values(&rel.lhs, a, b) else {
            return false;
        };
        let Some(rhs) = side_values(&rel.rhs, a, b) else {
            return false;
        };
        lhs.iter()
            .any(|l| rhs.iter().any(|r| satisfies(rel.op, l, r)))
    })
}

fn oriented_op(rel: &Relationship, alias: &str) -> CompareOp {
    if rel.lhs.alias == alias {
        rel.op
    } else {
        match rel.op {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            op => op,
        }
    }
}

/// Push the join key down to an unvisited neighbor: OR together, over
/// every accumulated row, the predicate the edge's relationships impose
/// on `alias`'s own fields. Works like an IN-list across potentially
/// disjoint values. Returns `None` when no accumulated row binds every
/// relationship field.
pub fn join_filter(
    rows: &[AttributeValues],
    relationships: &[Relationship],
    alias: &str,
) -> Option<Filter> {
    let mut out = None;
    let mut seen: Vec<Filter> = Vec::new();

    for row in rows {
        let mut conjunct = None;
        let mut complete = true;
        for rel in relationships {
            let Some((local, remote)) = rel.oriented(alias) else {
                complete = false;
                break;
            };
            let Some(values) = row.get(&remote.qualified()) else {
                complete = false;
                break;
            };
            let mut alternatives = None;
            for value in values {
                alternatives = append_or(
                    alternatives,
                    Some(Filter::Simple(SimpleFilter {
                        attribute: local.field.clone(),
                        op: oriented_op(rel, alias),
                        value: value.clone(),
                    })),
                );
            }
            match alternatives {
                Some(f) => conjunct = append_and(conjunct, Some(f)),
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if complete {
            if let Some(f) = conjunct {
                if !seen.contains(&f) {
                    seen.push(f.clone());
                    out = append_or(out, Some(f));
                }
            }
        }
    }
    out
}

/// Inner join: keep only matching combinations.
pub fn join(
    left: &[AttributeValues],
    right: &[AttributeValues],
    relationships: &[Relationship],
) -> Vec<AttributeValues> {
    let mut out = Vec::new();
    for l in left {
        for r in right {
            if evaluate(relationships, l, r) {
                let mut merged = l.clone();
                merged.add(r);
                out.push(merged);
            }
        }
    }
    out
}

/// Left join: keep every left row; unmatched rows pass through without
/// the right side's fields.
pub fn left_join(
    left: &[AttributeValues],
    right: &[AttributeValues],
    relationships: &[Relationship],
) -> Vec<AttributeValues> {
    let mut out = Vec::new();
    for l in left {
        let mut matched = false;
        for r in right {
            if evaluate(relationships, l, r) {
                let mut merged = l.clone();
                merged.add(r);
                out.push(merged);
                matched = true;
            }
        }
        if !matched {
            out.push(l.clone());
        }
    }
    out
}
