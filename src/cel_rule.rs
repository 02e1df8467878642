//! CEL expression rules (requires the `cel-eval` feature).
//!
//! A [`CelRule`] is a boolean expression over two variables: `value`, the
//! validated field's value, and `values`, the whole form. Any result other
//! than `true` (including evaluation errors and missing keys) fails the
//! rule with its configured message.

use crate::error::{FormError, Result};
use crate::value::Value;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct CelRule {
    expression: String,
    program: Arc<cel::Program>,
    message: String,
}

impl CelRule {
    /// Compiles `expression` once; syntax errors surface here, at
    /// configuration time.
    pub fn new(expression: impl Into<String>, message: impl Into<String>) -> Result<Self> {
        let expression = expression.into();
        let program = cel::Program::compile(&expression)
            .map_err(|e| FormError::InvalidConfig(format!("CEL compile error: {}", e)))?;
        Ok(Self {
            expression,
            program: Arc::new(program),
            message: message.into(),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The rule's message when the expression does not evaluate to `true`.
    pub fn check(&self, value: &Value, values: &Value) -> Option<&str> {
        if self.evaluate(value, values) {
            None
        } else {
            Some(self.message.as_str())
        }
    }

    fn evaluate(&self, value: &Value, values: &Value) -> bool {
        let mut ctx = cel::Context::default();
        ctx.add_variable_from_value("value", json_to_cel(&value.to_json()));
        ctx.add_variable_from_value("values", json_to_cel(&values.to_json()));

        match self.program.execute(&ctx) {
            Ok(cel::Value::Bool(b)) => b,
            Ok(_) => false,
            Err(cel::ExecutionError::NoSuchKey(_))
            | Err(cel::ExecutionError::UndeclaredReference(_)) => false,
            Err(e) => {
                tracing::debug!(expression = %self.expression, error = %e, "CEL execution error");
                false
            }
        }
    }
}

fn json_to_cel(value: &Json) -> cel::Value {
    match value {
        Json::Null => cel::Value::Null,
        Json::Bool(b) => cel::Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                cel::Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                cel::Value::UInt(u)
            } else if let Some(f) = n.as_f64() {
                cel::Value::Float(f)
            } else {
                cel::Value::Null
            }
        }
        Json::String(s) => cel::Value::String(Arc::new(s.clone())),
        Json::Array(arr) => cel::Value::List(Arc::new(arr.iter().map(json_to_cel).collect())),
        Json::Object(map) => {
            let entries: HashMap<String, cel::Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), json_to_cel(v)))
                .collect();
            entries.into()
        }
    }
}
