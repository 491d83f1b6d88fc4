//! ValueSet registry backing the `randomCode` directive

use std::cell::RefCell;

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::RecastError;
use crate::result::Result;

/// One selectable code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    pub system: String,
    pub code: String,
    pub display: String,
}

#[derive(Debug, Default, Deserialize)]
struct ValueSetJson {
    url: Option<String>,
    #[serde(default)]
    compose: Option<Compose>,
    #[serde(default)]
    expansion: Option<Expansion>,
}

#[derive(Debug, Default, Deserialize)]
struct Compose {
    #[serde(default)]
    include: Vec<Include>,
}

#[derive(Debug, Default, Deserialize)]
struct Include {
    system: Option<String>,
    #[serde(default)]
    concept: Vec<Concept>,
}

#[derive(Debug, Default, Deserialize)]
struct Concept {
    code: String,
    #[serde(default)]
    display: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Expansion {
    #[serde(default)]
    contains: Vec<Contains>,
}

#[derive(Debug, Default, Deserialize)]
struct Contains {
    system: Option<String>,
    code: Option<String>,
    display: Option<String>,
}

impl ValueSetJson {
    /// Expansion entries win over `compose.include` when both are present
    fn codes(self) -> Vec<Code> {
        if let Some(expansion) = self.expansion
            && !expansion.contains.is_empty()
        {
            return expansion
                .contains
                .into_iter()
                .filter_map(|entry| {
                    Some(Code {
                        system: entry.system?,
                        code: entry.code?,
                        display: entry.display.unwrap_or_default(),
                    })
                })
                .collect();
        }

        self.compose
            .map(|compose| {
                compose
                    .include
                    .into_iter()
                    .flat_map(|include| {
                        let system = include.system.unwrap_or_default();
                        include.concept.into_iter().map(move |concept| Code {
                            system: system.clone(),
                            display: concept.display.unwrap_or_else(|| concept.code.clone()),
                            code: concept.code,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Codes by ValueSet canonical url, with a seedable random source
#[derive(Debug)]
pub struct CodeRegistry {
    value_sets: IndexMap<String, Vec<Code>>,
    rng: RefCell<StdRng>,
}

impl Default for CodeRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CodeRegistry {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            value_sets: IndexMap::new(),
            rng: RefCell::new(rng),
        }
    }

    pub fn len(&self) -> usize {
        self.value_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value_sets.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.value_sets.contains_key(url)
    }

    /// Register a ValueSet given as JSON; returns its url
    pub fn load_value_set(&mut self, value: &JsonValue) -> Result<String> {
        let parsed: ValueSetJson = serde_json::from_value(value.clone())
            .map_err(|e| RecastError::mapping_error(format!("invalid ValueSet: {e}")))?;
        let url = parsed
            .url
            .clone()
            .ok_or_else(|| RecastError::mapping_error("ValueSet has no url"))?;
        let codes = parsed.codes();
        if codes.is_empty() {
            return Err(RecastError::mapping_error(format!(
                "ValueSet '{url}' has no codes to choose from"
            )));
        }
        debug!("Loaded ValueSet {} with {} codes", url, codes.len());
        self.value_sets.insert(url.clone(), codes);
        Ok(url)
    }

    /// Pick one code uniformly at random
    pub fn random_code(&self, url: &str) -> Option<Code> {
        let codes = self.value_sets.get(url)?;
        let index = self.rng.borrow_mut().random_range(0..codes.len());
        codes.get(index).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn colors() -> JsonValue {
        json!({
            "resourceType": "ValueSet",
            "url": "http://example.org/vs/colors",
            "compose": {"include": [{
                "system": "http://example.org/cs/colors",
                "concept": [
                    {"code": "red", "display": "Red"},
                    {"code": "green", "display": "Green"},
                    {"code": "blue"}
                ]
            }]}
        })
    }

    #[test]
    fn test_compose_concepts() {
        let mut registry = CodeRegistry::new(Some(7));
        let url = registry.load_value_set(&colors()).unwrap();
        assert_eq!(url, "http://example.org/vs/colors");

        let code = registry.random_code(&url).unwrap();
        assert_eq!(code.system, "http://example.org/cs/colors");
        assert!(["red", "green", "blue"].contains(&code.code.as_str()));
        assert!(registry.random_code("http://example.org/vs/unknown").is_none());
    }

    #[test]
    fn test_expansion_is_preferred() {
        let mut registry = CodeRegistry::new(Some(1));
        registry
            .load_value_set(&json!({
                "resourceType": "ValueSet",
                "url": "urn:vs",
                "compose": {"include": [{"system": "a", "concept": [{"code": "x"}]}]},
                "expansion": {"contains": [{"system": "b", "code": "y", "display": "Y"}]}
            }))
            .unwrap();
        assert_eq!(
            registry.random_code("urn:vs").unwrap(),
            Code {
                system: "b".into(),
                code: "y".into(),
                display: "Y".into()
            }
        );
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let picks = |seed| {
            let mut registry = CodeRegistry::new(Some(seed));
            registry.load_value_set(&colors()).unwrap();
            (0..10)
                .map(|_| registry.random_code("http://example.org/vs/colors").unwrap().code)
                .collect::<Vec<_>>()
        };
        assert_eq!(picks(42), picks(42));
    }

    #[test]
    fn test_empty_or_unnamed_value_sets_are_rejected() {
        let mut registry = CodeRegistry::default();
        assert!(registry.load_value_set(&json!({"resourceType": "ValueSet"})).is_err());
        assert!(
            registry
                .load_value_set(&json!({"resourceType": "ValueSet", "url": "urn:empty"}))
                .is_err()
        );
        assert!(registry.is_empty());
    }
}
