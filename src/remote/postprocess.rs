//! Regex rewriting of string fields in remote index responses.
//!
//! Rules are keyed by field name. Every string reachable under a matching
//! field is rewritten by each `(pattern, replacement)` pair in order. List
//! elements inherit the field name of the list that holds them.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;

use crate::error::ConfigError;

/// Raw rule set as written in configuration: field → `[(pattern, replacement)]`.
pub type RuleSet = BTreeMap<String, Vec<(String, String)>>;

#[derive(Debug, Clone, Default)]
pub struct RegexPostprocessor {
    rules: BTreeMap<String, Vec<(Regex, String)>>,
}

impl RegexPostprocessor {
    pub fn new(rules: &RuleSet) -> Result<Self, ConfigError> {
        let mut compiled = BTreeMap::new();
        for (field, pairs) in rules {
            let mut list = Vec::with_capacity(pairs.len());
            for (pattern, replacement) in pairs {
                let re = Regex::new(pattern).map_err(|source| ConfigError::InvalidRule {
                    field: field.clone(),
                    source,
                })?;
                list.push((re, replacement.clone()));
            }
            compiled.insert(field.clone(), list);
        }
        Ok(Self { rules: compiled })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn process(&self, mut value: Value) -> Value {
        if !self.rules.is_empty() {
            self.visit(&mut value, None);
        }
        value
    }

    /// Rewrite a single string as if it were held by `field`.
    pub fn process_field(&self, field: &str, value: &str) -> String {
        self.rewrite(field, value).unwrap_or_else(|| value.to_string())
    }

    fn visit(&self, value: &mut Value, field: Option<&str>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map.iter_mut() {
                    self.visit(child, Some(key.as_str()));
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.visit(item, field);
                }
            }
            Value::String(s) => {
                if let Some(name) = field
                    && let Some(rewritten) = self.rewrite(name, s.as_str())
                {
                    *s = rewritten;
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }

    fn rewrite(&self, field: &str, input: &str) -> Option<String> {
        let rules = self.rules.get(field)?;
        let mut out = input.to_string();
        for (re, replacement) in rules {
            out = re.replace_all(&out, replacement.as_str()).into_owned();
        }
        Some(out)
    }
}
