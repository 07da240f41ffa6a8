//! Filter pushdown.
//!
//! Rewrites a logical (entry-level) filter into a filter over one source's
//! own field names, or `None` when the filter places no constraint on that
//! source. `None` is the sound fallback everywhere: a source fetched
//! unfiltered is later narrowed by joins and merge, while a fabricated
//! constraint would silently drop matching entries.

use crate::error::Error;
use crate::interp::Interpreter;
use crate::mapping::{EntryMapping, MappingValue, SourceMapping};
use crate::record::AttributeValues;
use vdir_proto::{append_and, append_or, CompareOp, Filter, SimpleFilter, SubstringFilter};

/// Translate a logical filter for one source.
///
/// `parent` carries `alias.field` values inherited from ancestor entries;
/// they participate as interpreter bindings so expressions spanning
/// entries still evaluate.
pub fn translate(
    entry: &EntryMapping,
    source: &SourceMapping,
    filter: &Filter,
    parent: &AttributeValues,
    interpreter: &dyn Interpreter,
) -> Result<Option<Filter>, Error> {
    match filter {
        Filter::And(children) => {
            let mut out = None;
            for child in children {
                let translated = translate(entry, source, child, parent, interpreter)?;
                out = append_and(out, translated);
            }
            Ok(out)
        }
        Filter::Or(children) => {
            let mut out = None;
            for child in children {
                let translated = translate(entry, source, child, parent, interpreter)?;
                out = append_or(out, translated);
            }
            Ok(out)
        }
        Filter::Not(child) => {
            match translate(entry, source, child, parent, interpreter)? {
                Some(translated) => Ok(Some(Filter::Not(Box::new(translated)))),
                // A negation of "no constraint" is still no constraint.
                None => Ok(None),
            }
        }
        Filter::Simple(simple) => translate_simple(source, simple, parent, interpreter),
        Filter::Substring(substring) => Ok(translate_substring(entry, source, substring)),
    }
}

/// Equality and ordering nodes.
///
/// The attribute/value pair is bound as an interpreter variable alongside
/// the parent context, then every non-constant field mapping of the source
/// is evaluated; each one that yields a value contributes a conjunct.
/// Constant field mappings never contribute: they hold regardless of the
/// logical filter, and pushing them would fabricate a constraint.
fn translate_simple(
    source: &SourceMapping,
    filter: &SimpleFilter,
    parent: &AttributeValues,
    interpreter: &dyn Interpreter,
) -> Result<Option<Filter>, Error> {
    let mut bindings = parent.clone();
    bindings.set(filter.attribute.clone(), vec![filter.value.clone()]);

    let mut out = None;
    for field in &source.fields {
        let conjunct = match &field.value {
            MappingValue::Constant(_) => None,
            MappingValue::Variable(name) if name == &filter.attribute => {
                // Identity mapping: the comparison carries over as-is.
                Some(Filter::Simple(SimpleFilter {
                    attribute: field.name.clone(),
                    op: filter.op,
                    value: filter.value.clone(),
                }))
            }
            MappingValue::Variable(name) => {
                if filter.is_presence() || filter.op != CompareOp::Eq {
                    None
                } else {
                    bindings.first(name).map(|value| {
                        Filter::Simple(SimpleFilter {
                            attribute: field.name.clone(),
                            op: CompareOp::Eq,
                            value: value.clone(),
                        })
                    })
                }
            }
            MappingValue::Expression(expression) => {
                // Evaluating an expression against a wildcard or ordered
                // bound would manufacture a bogus comparison value.
                if filter.is_presence() || filter.op != CompareOp::Eq {
                    None
                } else {
                    interpreter.eval(expression, &bindings)?.map(|value| {
                        Filter::Simple(SimpleFilter {
                            attribute: field.name.clone(),
                            op: CompareOp::Eq,
                            value,
                        })
                    })
                }
            }
        };
        out = append_and(out, conjunct);
    }
    Ok(out)
}

/// Substring nodes route through the attribute's declared variable; the
/// backend connector owns final pattern syntax. An attribute mapped from
/// another alias, an expression, or a constant gives this source no
/// constraint.
fn translate_substring(
    entry: &EntryMapping,
    source: &SourceMapping,
    filter: &SubstringFilter,
) -> Option<Filter> {
    let mapping = entry.attribute_mapping(&filter.attribute)?;
    let MappingValue::Variable(variable) = &mapping.value else {
        return None;
    };
    let (alias, field) = variable.split_once('.')?;
    if alias != source.alias {
        return None;
    }
    Some(Filter::Substring(SubstringFilter {
        attribute: field.to_string(),
        pattern: filter.pattern.clone(),
    }))
}
