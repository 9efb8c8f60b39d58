//! `{var:name}` placeholder expansion.
//!
//! Configuration values, step fields, and patched file contents may embed
//! `{var:name}` placeholders. A name resolves against (in order) the
//! expander's extra sources, the phase sections' raw two-tier values, and
//! the environment overlay; the first hit wins. Substitution repeats until
//! the text stops changing, bounded by a pass cap, so resolved values may
//! themselves carry placeholders. A name that resolves nowhere is left in
//! the text unchanged.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::env::EnvOverlay;

static VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{var:([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid pattern"));

// Caps transitive substitution; self-referential values stop expanding
// instead of looping.
const MAX_PASSES: usize = 10;

/// Anything placeholder names can resolve against: a phase section's raw
/// layered values or a plain field map.
pub trait VarSource {
    fn raw_lookup(&self, name: &str) -> Option<&Value>;
}

impl VarSource for Map<String, Value> {
    fn raw_lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

pub struct Expander<'a> {
    sources: Vec<&'a dyn VarSource>,
    env: &'a EnvOverlay,
}

impl<'a> Expander<'a> {
    pub fn new(env: &'a EnvOverlay) -> Self {
        Self {
            sources: Vec::new(),
            env,
        }
    }

    /// Append a resolution source. Earlier sources win.
    pub fn with_source(mut self, source: &'a dyn VarSource) -> Self {
        self.sources.push(source);
        self
    }

    fn resolve(&self, name: &str) -> Option<String> {
        for source in &self.sources {
            if let Some(value) = source.raw_lookup(name) {
                if let Some(text) = scalar_text(value) {
                    return Some(text);
                }
            }
        }
        self.env.get(name).map(str::to_string)
    }

    /// Expand every placeholder in `input`, repeatedly, until stable.
    pub fn expand_str(&self, input: &str) -> String {
        let mut current = input.to_string();
        for _ in 0..MAX_PASSES {
            let next = VAR_PATTERN.replace_all(&current, |caps: &Captures| {
                self.resolve(&caps[1])
                    .unwrap_or_else(|| caps[0].to_string())
            });
            if next == current {
                break;
            }
            current = next.into_owned();
        }
        current
    }

    /// Expand a value tree: strings directly, arrays element-wise, objects
    /// value-wise. Non-string scalars pass through untouched.
    pub fn expand_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.expand_str(s)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.expand_value(v)).collect())
            }
            Value::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), self.expand_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// Scalar rendering for placeholder substitution. Composite values do not
/// substitute into text.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
