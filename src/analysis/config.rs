//! Metrics configuration
//!
//! Latency metrics name one target label; total-time metrics name a set of
//! labels whose overlap-merged duration is reported. Names are unique within
//! each list and neither list may become empty.

use crate::error::TimelineError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

fn enabled_by_default() -> bool {
    true
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Time from the session anchor to the first occurrence of `behavior`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyMetric {
    pub name: String,
    pub behavior: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

/// Combined, overlap-merged duration of `behaviors`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalTimeMetric {
    pub name: String,
    pub behaviors: Vec<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    latency_metrics: Vec<LatencyMetric>,
    #[serde(default)]
    total_time_metrics: Vec<TotalTimeMetric>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            latency_metrics: vec![LatencyMetric {
                name: "Attack Latency".to_string(),
                behavior: "Attack bites".to_string(),
                enabled: true,
            }],
            total_time_metrics: vec![
                TotalTimeMetric {
                    name: "Total Aggression".to_string(),
                    behaviors: owned(&["Attack bites", "Sideways threats", "Tail rattles", "Chasing"]),
                    enabled: true,
                },
                TotalTimeMetric {
                    name: "Total Aggression(without tail-rattles)".to_string(),
                    behaviors: owned(&["Attack bites", "Sideways threats", "Chasing"]),
                    enabled: true,
                },
            ],
        }
    }
}

impl MetricsConfig {
    pub fn latency_metrics(&self) -> &[LatencyMetric] {
        &self.latency_metrics
    }

    pub fn total_time_metrics(&self) -> &[TotalTimeMetric] {
        &self.total_time_metrics
    }

    pub fn enabled_latency_metrics(&self) -> impl Iterator<Item = &LatencyMetric> {
        self.latency_metrics.iter().filter(|m| m.enabled)
    }

    pub fn enabled_total_time_metrics(&self) -> impl Iterator<Item = &TotalTimeMetric> {
        self.total_time_metrics.iter().filter(|m| m.enabled)
    }

    pub fn add_latency_metric(
        &mut self,
        name: &str,
        behavior: &str,
        enabled: bool,
    ) -> Result<(), TimelineError> {
        if self.latency_metrics.iter().any(|m| m.name == name) {
            warn!("Latency metric '{}' already exists", name);
            return Err(TimelineError::DuplicateMetric(name.to_string()));
        }
        self.latency_metrics.push(LatencyMetric {
            name: name.to_string(),
            behavior: behavior.to_string(),
            enabled,
        });
        info!("Added latency metric '{}' for '{}'", name, behavior);
        Ok(())
    }

    pub fn add_total_time_metric(
        &mut self,
        name: &str,
        behaviors: Vec<String>,
        enabled: bool,
    ) -> Result<(), TimelineError> {
        if self.total_time_metrics.iter().any(|m| m.name == name) {
            warn!("Total time metric '{}' already exists", name);
            return Err(TimelineError::DuplicateMetric(name.to_string()));
        }
        info!("Added total time metric '{}' over {:?}", name, behaviors);
        self.total_time_metrics.push(TotalTimeMetric {
            name: name.to_string(),
            behaviors,
            enabled,
        });
        Ok(())
    }

    /// Replace a latency metric, renaming it if `new_name` differs
    pub fn update_latency_metric(
        &mut self,
        old_name: &str,
        new_name: &str,
        behavior: &str,
        enabled: bool,
    ) -> Result<(), TimelineError> {
        if old_name != new_name && self.latency_metrics.iter().any(|m| m.name == new_name) {
            return Err(TimelineError::DuplicateMetric(new_name.to_string()));
        }
        let metric = self
            .latency_metrics
            .iter_mut()
            .find(|m| m.name == old_name)
            .ok_or_else(|| TimelineError::MetricNotFound(old_name.to_string()))?;
        *metric = LatencyMetric {
            name: new_name.to_string(),
            behavior: behavior.to_string(),
            enabled,
        };
        Ok(())
    }

    /// Replace a total-time metric, renaming it if `new_name` differs
    pub fn update_total_time_metric(
        &mut self,
        old_name: &str,
        new_name: &str,
        behaviors: Vec<String>,
        enabled: bool,
    ) -> Result<(), TimelineError> {
        if old_name != new_name && self.total_time_metrics.iter().any(|m| m.name == new_name) {
            return Err(TimelineError::DuplicateMetric(new_name.to_string()));
        }
        let metric = self
            .total_time_metrics
            .iter_mut()
            .find(|m| m.name == old_name)
            .ok_or_else(|| TimelineError::MetricNotFound(old_name.to_string()))?;
        *metric = TotalTimeMetric {
            name: new_name.to_string(),
            behaviors,
            enabled,
        };
        Ok(())
    }

    pub fn remove_latency_metric(&mut self, name: &str) -> Result<LatencyMetric, TimelineError> {
        let pos = self
            .latency_metrics
            .iter()
            .position(|m| m.name == name)
            .ok_or_else(|| TimelineError::MetricNotFound(name.to_string()))?;
        if self.latency_metrics.len() == 1 {
            warn!("Refusing to remove the last latency metric '{}'", name);
            return Err(TimelineError::LastMetric("latency"));
        }
        Ok(self.latency_metrics.remove(pos))
    }

    pub fn remove_total_time_metric(&mut self, name: &str) -> Result<TotalTimeMetric, TimelineError> {
        let pos = self
            .total_time_metrics
            .iter()
            .position(|m| m.name == name)
            .ok_or_else(|| TimelineError::MetricNotFound(name.to_string()))?;
        if self.total_time_metrics.len() == 1 {
            warn!("Refusing to remove the last total time metric '{}'", name);
            return Err(TimelineError::LastMetric("total time"));
        }
        Ok(self.total_time_metrics.remove(pos))
    }

    pub fn reset_to_defaults(&mut self) {
        *self = Self::default();
    }

    /// Check name uniqueness and that neither list is empty
    pub fn validate(&self) -> Result<(), TimelineError> {
        if self.latency_metrics.is_empty() {
            return Err(TimelineError::InvalidConfig("no latency metrics".to_string()));
        }
        if self.total_time_metrics.is_empty() {
            return Err(TimelineError::InvalidConfig("no total time metrics".to_string()));
        }
        let mut seen = HashSet::new();
        for name in self.latency_metrics.iter().map(|m| &m.name) {
            if !seen.insert(name) {
                return Err(TimelineError::DuplicateMetric(name.clone()));
            }
        }
        seen.clear();
        for name in self.total_time_metrics.iter().map(|m| &m.name) {
            if !seen.insert(name) {
                return Err(TimelineError::DuplicateMetric(name.clone()));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, TimelineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, TimelineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, TimelineError> {
        let path = path.as_ref();
        let config = Self::from_json(&std::fs::read_to_string(path)?)?;
        info!("Loaded metrics configuration from {}", path.display());
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), TimelineError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = MetricsConfig::default();
        assert_eq!(config.latency_metrics().len(), 1);
        assert_eq!(config.latency_metrics()[0].behavior, "Attack bites");
        assert_eq!(config.total_time_metrics().len(), 2);
        assert_eq!(config.total_time_metrics()[1].behaviors.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut config = MetricsConfig::default();
        let err = config.add_latency_metric("Attack Latency", "Chasing", true);
        assert!(matches!(err, Err(TimelineError::DuplicateMetric(_))));
        assert_eq!(config.latency_metrics().len(), 1);

        config.add_latency_metric("Chase Latency", "Chasing", true).unwrap();
        let err = config.update_latency_metric("Chase Latency", "Attack Latency", "Chasing", true);
        assert!(matches!(err, Err(TimelineError::DuplicateMetric(_))));
    }

    #[test]
    fn test_cannot_remove_last_metric() {
        let mut config = MetricsConfig::default();
        assert!(matches!(
            config.remove_latency_metric("Attack Latency"),
            Err(TimelineError::LastMetric("latency"))
        ));
        config.remove_total_time_metric("Total Aggression").unwrap();
        assert!(matches!(
            config.remove_total_time_metric("Total Aggression(without tail-rattles)"),
            Err(TimelineError::LastMetric(_))
        ));
        assert!(matches!(
            config.remove_total_time_metric("Missing"),
            Err(TimelineError::MetricNotFound(_))
        ));
    }

    #[test]
    fn test_update_and_enabled_filter() {
        let mut config = MetricsConfig::default();
        config
            .update_total_time_metric(
                "Total Aggression",
                "Total Aggression",
                vec!["Chasing".to_string()],
                false,
            )
            .unwrap();
        let enabled: Vec<_> = config.enabled_total_time_metrics().map(|m| m.name.as_str()).collect();
        assert_eq!(enabled, vec!["Total Aggression(without tail-rattles)"]);
    }

    #[test]
    fn test_json_roundtrip_and_validation() {
        let mut config = MetricsConfig::default();
        config.add_latency_metric("Chase Latency", "Chasing", false).unwrap();
        let parsed = MetricsConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);

        let empty = r#"{"latency_metrics": [], "total_time_metrics": [{"name": "T", "behaviors": []}]}"#;
        assert!(matches!(MetricsConfig::from_json(empty), Err(TimelineError::InvalidConfig(_))));

        let defaults_enabled = r#"{"latency_metrics": [{"name": "L", "behavior": "Chasing"}],
            "total_time_metrics": [{"name": "T", "behaviors": ["Chasing"]}]}"#;
        assert!(MetricsConfig::from_json(defaults_enabled).unwrap().latency_metrics()[0].enabled);
    }

    #[test]
    fn test_reset_to_defaults() {
        let mut config = MetricsConfig::default();
        config.add_latency_metric("Chase Latency", "Chasing", true).unwrap();
        config.reset_to_defaults();
        assert_eq!(config, MetricsConfig::default());
    }
}
