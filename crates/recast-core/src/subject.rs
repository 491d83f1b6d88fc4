//! Subject context: attributes and module state history of the record's subject
//!
//! `getAttribute` reads attributes; `create_resource` with a `based_on`
//! module and state reads the history.

use std::path::Path;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::RecastError;
use crate::result::Result;

/// Read access to whoever the bundle describes
pub trait SubjectContext {
    fn attribute(&self, name: &str) -> Option<&JsonValue>;

    /// Visited states of a module in visit order; `None` when the module never ran
    fn module_history(&self, module: &str) -> Option<&[StateVisit]>;
}

/// One pass through a module state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVisit {
    pub name: String,
    #[serde(default)]
    pub entered: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exited: Option<DateTime<Utc>>,
    /// Id of the Encounter this state started, for encounter states
    #[serde(default)]
    pub encounter: Option<String>,
}

impl StateVisit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entered: None,
            exited: None,
            encounter: None,
        }
    }
}

/// Subject loaded from a YAML or JSON file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    #[serde(default)]
    pub attributes: IndexMap<String, JsonValue>,
    #[serde(default)]
    pub modules: IndexMap<String, Vec<StateVisit>>,
}

impl SubjectRecord {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| RecastError::io_error(path, e))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&text).map_err(|e| RecastError::parse_error(path, e))
        } else {
            serde_yaml::from_str(&text).map_err(|e| RecastError::parse_error(path, e))
        }
    }

    pub fn with_attribute(mut self, name: &str, value: JsonValue) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    pub fn with_module(mut self, module: &str, history: Vec<StateVisit>) -> Self {
        self.modules.insert(module.to_string(), history);
        self
    }
}

impl SubjectContext for SubjectRecord {
    fn attribute(&self, name: &str) -> Option<&JsonValue> {
        self.attributes.get(name)
    }

    fn module_history(&self, module: &str) -> Option<&[StateVisit]> {
        self.modules.get(module).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_load_yaml_subject() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("subject.yaml");
        std::fs::write(
            &path,
            r#"
attributes:
  smoker: true
  race: white
modules:
  Diabetes:
    - name: Initial
      entered: 2020-01-01T00:00:00Z
      exited: 2020-01-01T00:00:00Z
    - name: Wellness_Encounter
      entered: 2020-02-01T09:00:00Z
      exited: 2020-02-01T10:00:00Z
      encounter: enc-1
"#,
        )
        .unwrap();

        let subject = SubjectRecord::load(&path).unwrap();
        assert_eq!(subject.attribute("smoker"), Some(&json!(true)));
        let history = subject.module_history("Diabetes").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].encounter.as_deref(), Some("enc-1"));
        assert_eq!(
            history[1].entered.unwrap().to_rfc3339(),
            "2020-02-01T09:00:00+00:00"
        );
        assert!(subject.module_history("Asthma").is_none());
    }

    #[test]
    fn test_load_json_subject_and_bad_input() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("subject.json");
        std::fs::write(&good, r#"{"attributes": {"age": 42}}"#).unwrap();
        let subject = SubjectRecord::load(&good).unwrap();
        assert_eq!(subject.attribute("age"), Some(&json!(42)));
        assert!(subject.modules.is_empty());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "[1, 2").unwrap();
        assert!(SubjectRecord::load(&bad).is_err());
        assert!(SubjectRecord::load(&dir.path().join("missing.yaml")).is_err());
    }
}
