//! Trigger key to behavior label mapping
//!
//! Persisted as a flat JSON object, e.g. `{"o": "Attack bites"}`.

use crate::error::TimelineError;
use crate::types::TriggerId;
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::Path;

/// Built-in key bindings
pub const DEFAULT_MAPPINGS: [(char, &str); 8] = [
    ('o', "Attack bites"),
    ('j', "Sideways threats"),
    ('p', "Tail rattles"),
    ('q', "Chasing"),
    ('a', "Social contact"),
    ('e', "Self-grooming"),
    ('t', "Locomotion"),
    ('r', "Rearing"),
];

/// Single-character triggers mapped to behavior labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionMap {
    mappings: BTreeMap<char, String>,
}

impl Default for ActionMap {
    fn default() -> Self {
        Self {
            mappings: DEFAULT_MAPPINGS
                .iter()
                .map(|(key, label)| (*key, label.to_string()))
                .collect(),
        }
    }
}

impl ActionMap {
    /// An empty map
    pub fn empty() -> Self {
        Self {
            mappings: BTreeMap::new(),
        }
    }

    /// Bind `key` (exactly one character) to a non-blank `label`
    pub fn add_mapping(&mut self, key: &str, label: &str) -> Result<(), TimelineError> {
        let mut chars = key.chars();
        let key = match (chars.next(), chars.next()) {
            (Some(c), None) if !c.is_whitespace() => c,
            _ => {
                return Err(TimelineError::InvalidMapping(format!(
                    "key must be a single character, got '{}'",
                    key
                )))
            }
        };
        let label = label.trim();
        if label.is_empty() {
            return Err(TimelineError::InvalidMapping(format!(
                "label for '{}' must not be empty",
                key
            )));
        }

        if let Some(previous) = self.mappings.insert(key, label.to_string()) {
            info!("Remapped '{}': {} -> {}", key, previous, label);
        }
        Ok(())
    }

    pub fn remove_mapping(&mut self, key: char) -> Result<String, TimelineError> {
        self.mappings
            .remove(&key)
            .ok_or_else(|| TimelineError::UnmappedTrigger(TriggerId::from(key)))
    }

    /// Label bound to a trigger, if any
    pub fn label_for(&self, trigger: &TriggerId) -> Option<&str> {
        trigger
            .as_char()
            .and_then(|key| self.mappings.get(&key))
            .map(String::as_str)
    }

    /// Like [`label_for`](Self::label_for) but logs and fails for unmapped keys
    pub fn resolve(&self, trigger: &TriggerId) -> Result<&str, TimelineError> {
        self.label_for(trigger).ok_or_else(|| {
            warn!("Trigger '{}' is not mapped to a behavior", trigger);
            TimelineError::UnmappedTrigger(trigger.clone())
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (char, &str)> {
        self.mappings.iter().map(|(key, label)| (*key, label.as_str()))
    }

    /// Distinct labels in key order
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for label in self.mappings.values() {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        labels
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn to_json(&self) -> Result<String, TimelineError> {
        let raw: BTreeMap<String, &str> = self
            .mappings
            .iter()
            .map(|(key, label)| (key.to_string(), label.as_str()))
            .collect();
        Ok(serde_json::to_string_pretty(&raw)?)
    }

    /// Parse and validate a JSON mapping object
    pub fn from_json(json: &str) -> Result<Self, TimelineError> {
        let raw: BTreeMap<String, String> = serde_json::from_str(json)?;
        let mut map = Self::empty();
        for (key, label) in &raw {
            map.add_mapping(key, label)?;
        }
        Ok(map)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, TimelineError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), TimelineError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_mappings() {
        let map = ActionMap::default();
        assert_eq!(map.len(), 8);
        assert_eq!(map.label_for(&TriggerId::from('o')), Some("Attack bites"));
        assert_eq!(map.label_for(&TriggerId::from('z')), None);
        assert_eq!(map.label_for(&TriggerId::from("oo")), None);
    }

    #[test]
    fn test_add_mapping_validation() {
        let mut map = ActionMap::empty();
        assert!(matches!(map.add_mapping("ab", "X"), Err(TimelineError::InvalidMapping(_))));
        assert!(matches!(map.add_mapping("", "X"), Err(TimelineError::InvalidMapping(_))));
        assert!(matches!(map.add_mapping("x", "   "), Err(TimelineError::InvalidMapping(_))));
        map.add_mapping("x", " Digging ").unwrap();
        assert_eq!(map.label_for(&TriggerId::from('x')), Some("Digging"));
    }

    #[test]
    fn test_remove_and_resolve() {
        let mut map = ActionMap::default();
        assert_eq!(map.remove_mapping('r').unwrap(), "Rearing");
        assert!(map.remove_mapping('r').is_err());
        assert!(matches!(
            map.resolve(&TriggerId::from('r')),
            Err(TimelineError::UnmappedTrigger(_))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let map = ActionMap::default();
        let json = map.to_json().unwrap();
        assert!(json.contains("\"q\": \"Chasing\""));
        assert_eq!(ActionMap::from_json(&json).unwrap(), map);
    }

    #[test]
    fn test_from_json_rejects_invalid_keys() {
        assert!(ActionMap::from_json(r#"{"long": "Chasing"}"#).is_err());
        assert!(ActionMap::from_json("[1, 2]").is_err());
    }

    #[test]
    fn test_labels_are_distinct() {
        let mut map = ActionMap::empty();
        map.add_mapping("a", "Chasing").unwrap();
        map.add_mapping("b", "Chasing").unwrap();
        map.add_mapping("c", "Rearing").unwrap();
        assert_eq!(map.labels(), vec!["Chasing".to_string(), "Rearing".to_string()]);
    }
}
