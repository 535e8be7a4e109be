//! Per-group ordinal windows for duplicate resolution.

use crate::error::{BolflowError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed ordinal interval `[min, max]`.
///
/// Serialized as a two-element array, `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Window {
    pub min: f64,
    pub max: f64,
}

impl Window {
    /// Create a window, checking its bounds.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        let window = Self { min, max };
        window.validate()?;
        Ok(window)
    }

    /// Check that the bounds are finite and ordered.
    pub fn validate(&self) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(BolflowError::InvalidWindowSpec(format!(
                "window bounds must be finite, got [{}, {}]",
                self.min, self.max
            )));
        }
        if self.min > self.max {
            return Err(BolflowError::InvalidWindowSpec(format!(
                "window min {} exceeds max {}",
                self.min, self.max
            )));
        }
        Ok(())
    }

    /// Check if an ordinal falls inside the window (bounds inclusive).
    #[inline]
    pub fn contains(&self, position: f64) -> bool {
        position >= self.min && position <= self.max
    }
}

impl From<[f64; 2]> for Window {
    fn from(bounds: [f64; 2]) -> Self {
        Self {
            min: bounds[0],
            max: bounds[1],
        }
    }
}

impl From<Window> for [f64; 2] {
    fn from(window: Window) -> Self {
        [window.min, window.max]
    }
}

/// Windows keyed by group label.
///
/// Parsed from JSON objects such as `{"A": [0, 5], "B": [4, 10]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowSpec {
    windows: BTreeMap<String, Window>,
}

impl WindowSpec {
    /// Create an empty specification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the window of a group.
    pub fn with_window(mut self, group: &str, min: f64, max: f64) -> Self {
        self.windows.insert(group.to_string(), Window { min, max });
        self
    }

    /// Parse and validate a JSON window specification.
    pub fn from_json(json: &str) -> Result<Self> {
        let spec: Self = serde_json::from_str(json)
            .map_err(|e| BolflowError::InvalidWindowSpec(format!("'{}': {}", json, e)))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(BolflowError::from)
    }

    /// Check every window's bounds.
    pub fn validate(&self) -> Result<()> {
        for (group, window) in &self.windows {
            window.validate().map_err(|e| match e {
                BolflowError::InvalidWindowSpec(msg) => {
                    BolflowError::InvalidWindowSpec(format!("group '{}': {}", group, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Window of a group.
    pub fn get(&self, group: &str) -> Option<&Window> {
        self.windows.get(group)
    }

    /// Iterate over (group, window) pairs, sorted by group.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Window)> + '_ {
        self.windows.iter().map(|(g, w)| (g.as_str(), w))
    }

    /// Number of windowed groups.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Check if no window is specified.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let spec = WindowSpec::from_json(r#"{"A":[0,5], "B":[4,10]}"#).unwrap();
        assert_eq!(spec.len(), 2);
        assert_eq!(spec.get("A"), Some(&Window { min: 0.0, max: 5.0 }));
        assert_eq!(spec.get("B").unwrap().max, 10.0);
        assert!(spec.get("C").is_none());
    }

    #[test]
    fn test_json_roundtrip() {
        let spec = WindowSpec::new().with_window("QC", 1.5, 2.5);
        let json = spec.to_json().unwrap();
        assert_eq!(json, r#"{"QC":[1.5,2.5]}"#);
        assert_eq!(WindowSpec::from_json(&json).unwrap(), spec);
    }

    #[test]
    fn test_min_exceeds_max() {
        let err = WindowSpec::from_json(r#"{"A":[6,5]}"#).unwrap_err();
        assert!(matches!(err, BolflowError::InvalidWindowSpec(_)));
        assert!(Window::new(6.0, 5.0).is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            WindowSpec::from_json(r#"{"A":[1]}"#),
            Err(BolflowError::InvalidWindowSpec(_))
        ));
        assert!(matches!(
            WindowSpec::from_json("not json"),
            Err(BolflowError::InvalidWindowSpec(_))
        ));
    }

    #[test]
    fn test_contains_inclusive() {
        let w = Window::new(0.0, 5.0).unwrap();
        assert!(w.contains(0.0));
        assert!(w.contains(5.0));
        assert!(!w.contains(5.01));
        assert!(!w.contains(-1.0));
    }
}
