//! Expression evaluation.
//!
//! The engine never commits to an expression language. Field and attribute
//! expressions are evaluated through the [`Interpreter`] trait against the
//! variables currently in scope; [`ExprInterpreter`] covers the common
//! cases (quoted literals, variable references, `+` concatenation) and
//! anything richer plugs in behind the same trait.

use crate::error::Error;
use crate::mapping::MappingValue;
use crate::record::AttributeValues;
use vdir_proto::Value;

/// Evaluates a scripted expression against bound variables.
pub trait Interpreter: Send + Sync {
    /// Evaluate an expression. A missing variable yields `None` rather
    /// than an error; malformed expressions are errors.
    fn eval(&self, expression: &str, bindings: &AttributeValues) -> Result<Option<Value>, Error>;

    /// The variable names an expression references, used to infer which
    /// source supplies a naming attribute.
    fn variables(&self, expression: &str) -> Result<Vec<String>, Error>;
}

/// Evaluate a mapping's value producer.
///
/// Constants and variable references are handled inline; expressions are
/// delegated to the interpreter.
pub fn eval_mapping(
    mapping: &MappingValue,
    bindings: &AttributeValues,
    interpreter: &dyn Interpreter,
) -> Result<Option<Value>, Error> {
    match mapping {
        MappingValue::Constant(value) => Ok(Some(value.clone())),
        MappingValue::Variable(name) => Ok(bindings.first(name).cloned()),
        MappingValue::Expression(expression) => interpreter.eval(expression, bindings),
    }
}

/// Evaluate a mapping's value producer, preserving multiple values for
/// variable references.
pub fn eval_mapping_multi(
    mapping: &MappingValue,
    bindings: &AttributeValues,
    interpreter: &dyn Interpreter,
) -> Result<Option<Vec<Value>>, Error> {
    match mapping {
        MappingValue::Constant(value) => Ok(Some(vec![value.clone()])),
        MappingValue::Variable(name) => Ok(bindings.get(name).map(|v| v.to_vec())),
        MappingValue::Expression(expression) => {
            Ok(interpreter.eval(expression, bindings)?.map(|v| vec![v]))
        }
    }
}

/// The default interpreter: double-quoted literals, variable references,
/// and `+` string concatenation.
#[derive(Debug, Default)]
pub struct ExprInterpreter;

enum Part<'a> {
    Literal(&'a str),
    Variable(&'a str),
}

impl ExprInterpreter {
    fn parts<'a>(&self, expression: &'a str) -> Result<Vec<Part<'a>>, Error> {
        let mut parts = Vec::new();
        for raw in expression.split('+') {
            let token = raw.trim();
            if token.is_empty() {
                return Err(Error::Expression(format!(
                    "empty term in expression: {expression}"
                )));
            }
            if let Some(inner) = token.strip_prefix('"') {
                let Some(literal) = inner.strip_suffix('"') else {
                    return Err(Error::Expression(format!(
                        "unterminated literal in expression: {expression}"
                    )));
                };
                parts.push(Part::Literal(literal));
            } else {
                parts.push(Part::Variable(token));
            }
        }
        Ok(parts)
    }
}

impl Interpreter for ExprInterpreter {
    fn eval(&self, expression: &str, bindings: &AttributeValues) -> Result<Option<Value>, Error> {
        let parts = self.parts(expression)?;

        // A lone variable keeps its original type.
        if let [Part::Variable(name)] = parts.as_slice() {
            return Ok(bindings.first(name).cloned());
        }

        let mut out = String::new();
        for part in &parts {
            match part {
                Part::Literal(s) => out.push_str(s),
                Part::Variable(name) => match bindings.first(name) {
                    Some(value) => out.push_str(&value.to_string()),
                    None => return Ok(None),
                },
            }
        }
        Ok(Some(Value::String(out)))
    }

    fn variables(&self, expression: &str) -> Result<Vec<String>, Error> {
        let parts = self.parts(expression)?;
        Ok(parts
            .iter()
            .filter_map(|p| match p {
                Part::Variable(name) => Some((*name).to_string()),
                Part::Literal(_) => None,
            })
            .collect())
    }
}
