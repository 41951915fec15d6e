//! JSON path compiler and resolver
//!
//! Supports the subset used by mapping configuration:
//!
//! - `$` root element
//! - `.key` and `['key']` / `["key"]` member access
//! - `[n]` array index
//! - `[*]` / `.*` wildcard over array elements or object values
//!
//! A path without the leading `$` is treated as relative to the node it is
//! applied to (`city` is `$.city`). Resolution never fails: a path that does
//! not match yields `None`.

use serde_json::{Map, Value};
use std::borrow::Cow;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid JSON path '{path}': {reason}")]
pub struct JsonPathError {
    pub path: String,
    pub reason: String,
}

/// A single step in a compiled path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    Member(String),
    Index(usize),
    Wildcard,
}

/// A compiled JSON path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    source: String,
    steps: Vec<PathStep>,
}

impl JsonPath {
    /// Compile a path string.
    ///
    /// # Errors
    ///
    /// Returns an error on empty input, unclosed brackets, empty member
    /// names, or non-numeric indexes.
    pub fn compile(path: &str) -> Result<Self, JsonPathError> {
        let trimmed = path.trim();
        let fail = |reason: String| JsonPathError {
            path: path.to_string(),
            reason,
        };

        if trimmed.is_empty() {
            return Err(fail("empty path expression".into()));
        }

        let normalized: Cow<'_, str> = if trimmed.starts_with('$') {
            Cow::Borrowed(trimmed)
        } else if trimmed.starts_with('[') {
            Cow::Owned(format!("${}", trimmed))
        } else {
            Cow::Owned(format!("$.{}", trimmed))
        };

        let chars: Vec<char> = normalized.chars().collect();
        let mut steps = Vec::new();
        let mut pos = 1;

        while pos < chars.len() {
            match chars[pos] {
                '.' => {
                    pos += 1;
                    let start = pos;
                    while pos < chars.len() && chars[pos] != '.' && chars[pos] != '[' {
                        pos += 1;
                    }
                    let name: String = chars[start..pos].iter().collect();
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(fail(format!("empty member name at position {}", start)));
                    }
                    if name == "*" {
                        steps.push(PathStep::Wildcard);
                    } else {
                        steps.push(PathStep::Member(name.to_string()));
                    }
                },
                '[' => {
                    let close = chars[pos..]
                        .iter()
                        .position(|&c| c == ']')
                        .map(|offset| pos + offset)
                        .ok_or_else(|| fail("unclosed bracket".into()))?;
                    let inner: String = chars[pos + 1..close].iter().collect();
                    steps.push(parse_bracket(inner.trim()).map_err(fail)?);
                    pos = close + 1;
                },
                other => {
                    return Err(fail(format!("unexpected '{}' at position {}", other, pos)));
                },
            }
        }

        Ok(Self {
            source: trimmed.to_string(),
            steps,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// True when the path can match at most one node
    pub fn is_definite(&self) -> bool {
        !self.steps.iter().any(|s| matches!(s, PathStep::Wildcard))
    }

    /// Resolve the path against `root`.
    ///
    /// Definite paths return the matched node. Paths containing a wildcard
    /// collect every match into an array; no matches yields `None`.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<Cow<'a, Value>> {
        let mut current: Vec<&'a Value> = vec![root];

        for step in &self.steps {
            let mut next = Vec::new();
            for node in current {
                match (step, node) {
                    (PathStep::Member(name), Value::Object(map)) => {
                        if let Some(child) = map.get(name) {
                            next.push(child);
                        }
                    },
                    (PathStep::Index(i), Value::Array(items)) => {
                        if let Some(child) = items.get(*i) {
                            next.push(child);
                        }
                    },
                    (PathStep::Wildcard, Value::Array(items)) => next.extend(items.iter()),
                    (PathStep::Wildcard, Value::Object(map)) => next.extend(map.values()),
                    _ => {},
                }
            }
            if next.is_empty() {
                return None;
            }
            current = next;
        }

        if self.is_definite() {
            current.into_iter().next().map(Cow::Borrowed)
        } else {
            Some(Cow::Owned(Value::Array(current.into_iter().cloned().collect())))
        }
    }

    /// Write `value` at this path, creating intermediate objects as needed.
    ///
    /// Only definite paths can be written. Returns false when the path is
    /// indefinite, addresses the root, or crosses a non-container node.
    pub fn set(&self, root: &mut Value, value: Value) -> bool {
        let Some((last, parents)) = self.steps.split_last() else {
            return false;
        };
        if !self.is_definite() {
            return false;
        }

        let mut node = root;
        for step in parents {
            node = match step {
                PathStep::Member(name) => {
                    if node.is_null() {
                        *node = Value::Object(Map::new());
                    }
                    match node {
                        Value::Object(map) => {
                            map.entry(name.clone()).or_insert_with(|| Value::Object(Map::new()))
                        },
                        _ => return false,
                    }
                },
                PathStep::Index(i) => match node.get_mut(*i) {
                    Some(child) => child,
                    None => return false,
                },
                PathStep::Wildcard => return false,
            };
        }

        match (last, node) {
            (PathStep::Member(name), Value::Object(map)) => {
                map.insert(name.clone(), value);
                true
            },
            (PathStep::Index(i), Value::Array(items)) if *i < items.len() => {
                items[*i] = value;
                true
            },
            _ => false,
        }
    }

    /// Remove the node at this path, returning it if it existed
    pub fn remove(&self, root: &mut Value) -> Option<Value> {
        let (last, parents) = self.steps.split_last()?;
        if !self.is_definite() {
            return None;
        }

        let mut node = root;
        for step in parents {
            node = match step {
                PathStep::Member(name) => node.get_mut(name.as_str())?,
                PathStep::Index(i) => node.get_mut(*i)?,
                PathStep::Wildcard => return None,
            };
        }

        match (last, node) {
            (PathStep::Member(name), Value::Object(map)) => map.remove(name),
            (PathStep::Index(i), Value::Array(items)) if *i < items.len() => Some(items.remove(*i)),
            _ => None,
        }
    }
}

impl std::fmt::Display for JsonPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for JsonPath {
    type Err = JsonPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

fn parse_bracket(inner: &str) -> Result<PathStep, String> {
    if inner == "*" {
        return Ok(PathStep::Wildcard);
    }

    let quoted = ['\'', '"']
        .iter()
        .find(|&&q| inner.len() >= 2 && inner.starts_with(q) && inner.ends_with(q));
    if quoted.is_some() {
        let name = &inner[1..inner.len() - 1];
        if name.is_empty() {
            return Err("empty quoted member name".into());
        }
        return Ok(PathStep::Member(name.to_string()));
    }

    inner
        .parse::<usize>()
        .map(PathStep::Index)
        .map_err(|_| format!("invalid array index '{}'", inner))
}
