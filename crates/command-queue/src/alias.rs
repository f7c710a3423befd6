use std::collections::HashMap;

use tracing::debug;
use trellis_core_types::{EngineError, EngineResult};

use crate::subject::Subject;

/// Alias bindings of one test case.
///
/// Bindings are write-once unless rebound with `overwrite`. Reads hand back a
/// clone of the bound subject, which shares the same element ids and `Arc`s.
#[derive(Debug, Default)]
pub struct AliasTable {
    bindings: HashMap<String, Subject>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: &str, subject: Subject, overwrite: bool) -> EngineResult<()> {
        let name = normalize(name)?;
        if !overwrite && self.bindings.contains_key(name) {
            return Err(EngineError::AliasConflict(name.to_string()));
        }
        debug!(alias = name, subject = subject.kind(), overwrite, "alias bound");
        self.bindings.insert(name.to_string(), subject);
        Ok(())
    }

    /// Look up `name`, with or without the leading `@`.
    pub fn get(&self, name: &str) -> EngineResult<Subject> {
        let name = normalize(name)?;
        self.bindings
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::AliasNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        normalize(name)
            .map(|n| self.bindings.contains_key(n))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn clear(&mut self) -> usize {
        let dropped = self.bindings.len();
        self.bindings.clear();
        dropped
    }
}

fn normalize(name: &str) -> EngineResult<&str> {
    let trimmed = name.trim().trim_start_matches('@');
    if trimmed.is_empty() {
        return Err(EngineError::invalid_subject(
            "alias",
            "alias names must not be empty",
        ));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_once_unless_overwrite() {
        let mut aliases = AliasTable::new();
        aliases.bind("user", Subject::Value(json!(1)), false).unwrap();
        assert!(matches!(
            aliases.bind("@user", Subject::Value(json!(2)), false),
            Err(EngineError::AliasConflict(name)) if name == "user"
        ));
        aliases.bind("user", Subject::Value(json!(3)), true).unwrap();
        match aliases.get("@user").unwrap() {
            Subject::Value(value) => assert_eq!(value, json!(3)),
            other => panic!("unexpected subject {other:?}"),
        }
    }

    #[test]
    fn missing_and_empty_names() {
        let mut aliases = AliasTable::new();
        assert!(matches!(
            aliases.get("@nope"),
            Err(EngineError::AliasNotFound(_))
        ));
        assert!(aliases.bind("@", Subject::Window, false).is_err());
        aliases.bind("w", Subject::Window, false).unwrap();
        assert!(aliases.contains("@w"));
        assert_eq!(aliases.clear(), 1);
        assert!(aliases.is_empty());
    }
}
