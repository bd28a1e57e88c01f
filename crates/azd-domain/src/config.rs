use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DomainError;

/// A JSON object addressed by dotted paths such as `infra.parameters.location`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigTree(Map<String, Value>);

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut node = self.0.get(first)?;
        for seg in segments {
            node = node.as_object()?.get(seg)?;
        }
        Some(node)
    }

    /// Like [`get`](Self::get) but only returns non-empty strings.
    pub fn get_string(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// Set `value` at `path`, creating intermediate objects as needed.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), DomainError> {
        let (parents, leaf) = split_path(path)?;

        let mut node = &mut self.0;
        for seg in parents {
            let child = node
                .entry(seg.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            node = match child {
                Value::Object(map) => map,
                _ => {
                    return Err(DomainError::InvalidConfigPath {
                        path: path.to_string(),
                        reason: format!("'{seg}' is not an object"),
                    })
                }
            };
        }
        node.insert(leaf.to_string(), value.into());
        Ok(())
    }

    /// Remove the value at `path`. Missing paths are not an error.
    pub fn unset(&mut self, path: &str) -> Result<(), DomainError> {
        let (parents, leaf) = split_path(path)?;

        let mut node = &mut self.0;
        for seg in parents {
            match node.get_mut(seg) {
                Some(Value::Object(map)) => node = map,
                _ => return Ok(()),
            }
        }
        node.remove(leaf);
        Ok(())
    }
}

fn split_path(path: &str) -> Result<(Vec<&str>, &str), DomainError> {
    let mut segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(DomainError::InvalidConfigPath {
            path: path.to_string(),
            reason: "empty path segment".into(),
        });
    }
    let leaf = segments.pop().unwrap_or_default();
    Ok((segments, leaf))
}
