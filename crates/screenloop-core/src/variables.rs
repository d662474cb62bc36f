//! Flat variable store for a single run.
//!
//! Written by input-pause steps, read by loops that take their iteration
//! cap from a variable. There is no scoping: a value set inside a loop body
//! is still visible after the loop ends.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Integer(i64),
    Text(String),
}

impl VariableValue {
    /// Coerces an operator response: trimmed integers become `Integer`,
    /// anything else is kept verbatim as `Text`.
    pub fn from_input(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(n) => VariableValue::Integer(n),
            Err(_) => VariableValue::Text(raw.to_string()),
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            VariableValue::Integer(n) => Some(*n),
            VariableValue::Text(_) => None,
        }
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableValue::Integer(n) => write!(f, "{}", n),
            VariableValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct VariableStore {
    values: HashMap<String, VariableValue>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a variable.
    pub fn set(&mut self, name: impl Into<String>, value: VariableValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.values.get(name)
    }

    /// `None` when the variable is missing or holds text.
    pub fn get_integer(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(VariableValue::as_integer)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
