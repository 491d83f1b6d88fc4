//! Mapping definitions: a named, ordered list of actions over a bundle
//!
//! Each action object carries exactly one action key. Amounts, date bounds
//! and script targets are validated while loading, so a mapping that loads
//! is well formed.

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::engine::MappingEntry;
use crate::error::RecastError;
use crate::result::Result;
use crate::temporal::{DateRange, ShiftAmount};

/// A complete mapping file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    #[serde(default)]
    pub name: String,
    /// Bundle-level predicate; a bundle that fails it is left untouched
    #[serde(default)]
    pub applicability: Option<String>,
    #[serde(default)]
    pub variables: IndexMap<String, JsonValue>,
    /// ValueSet resources available to `$randomCode`
    #[serde(default)]
    pub custom_value_sets: Vec<JsonValue>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Mapping {
    /// Load from YAML, or JSON when the extension is `.json`
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| RecastError::io_error(path, e))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let mut mapping = if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
        .map_err(|e| match e {
            RecastError::MappingError { message } => RecastError::parse_error(path, message),
            other => other,
        })?;

        if mapping.name.is_empty()
            && let Some(stem) = path.file_stem()
        {
            mapping.name = stem.to_string_lossy().into_owned();
        }
        Ok(mapping)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| RecastError::mapping_error(e.to_string()))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| RecastError::mapping_error(e.to_string()))
    }
}

/// One step of a mapping
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawAction")]
pub struct Action {
    pub name: Option<String>,
    pub kind: ActionKind,
}

impl Action {
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({})", name, self.kind),
            None => self.kind.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ActionKind {
    ApplyProfiles(Vec<ProfileRule>),
    SetValues(Vec<SetValuesRule>),
    KeepResources(Vec<String>),
    DeleteResources(Vec<String>),
    CreateResource(Vec<CreateResourceRule>),
    ShiftDates(ShiftDatesRule),
    DateFilter(DateRange),
    ExecuteScript(Vec<ScriptRule>),
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match self {
            ActionKind::ApplyProfiles(_) => "profiles",
            ActionKind::SetValues(_) => "set_values",
            ActionKind::KeepResources(_) => "keep_resources",
            ActionKind::DeleteResources(_) => "delete_resources",
            ActionKind::CreateResource(_) => "create_resource",
            ActionKind::ShiftDates(_) => "shift_dates",
            ActionKind::DateFilter(_) => "date_filter",
            ActionKind::ExecuteScript(_) => "execute_script",
        };
        write!(f, "{key}")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProfileRule {
    pub profile: String,
    pub applicability: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetValuesRule {
    pub applicability: String,
    #[serde(default)]
    pub fields: Vec<MappingEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateResourceRule {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(default)]
    pub based_on: Option<BasedOn>,
    #[serde(default)]
    pub fields: Vec<MappingEntry>,
    #[serde(default)]
    pub profiles: Vec<String>,
    /// Applied to the source document, with the created document as current
    #[serde(default)]
    pub writeback: Vec<MappingEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BasedOn {
    /// Path selecting source documents in the bundle
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftDatesRule {
    pub amount: ShiftAmount,
    /// Limits shifting to the documents this selects
    pub applicability: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptTarget {
    Bundle,
    /// Each resource, optionally only those of one type
    Resources(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRule {
    pub function: String,
    pub function_name: String,
    pub target: ScriptTarget,
}

#[derive(Debug, Deserialize)]
struct RawScript {
    #[serde(default)]
    function: String,
    function_name: String,
    apply_to: String,
    #[serde(default)]
    resource_type: Option<String>,
}

impl TryFrom<RawScript> for ScriptRule {
    type Error = String;

    fn try_from(raw: RawScript) -> std::result::Result<Self, Self::Error> {
        let target = match raw.apply_to.to_ascii_lowercase().as_str() {
            "bundle" => ScriptTarget::Bundle,
            "resource" | "resources" => {
                ScriptTarget::Resources(raw.resource_type.filter(|t| !t.trim().is_empty()))
            }
            other => {
                return Err(format!(
                    "unknown execute_script apply_to '{other}', expected 'bundle' or 'resources'"
                ));
            }
        };
        Ok(Self {
            function: raw.function,
            function_name: raw.function_name,
            target,
        })
    }
}

/// `shift_dates: P1Y` or `shift_dates: {amount: P1Y, applicability: ...}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawShift {
    Amount(String),
    Detailed {
        amount: String,
        #[serde(default)]
        applicability: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct RawAction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    profiles: Option<Vec<ProfileRule>>,
    #[serde(default)]
    set_values: Option<Vec<SetValuesRule>>,
    #[serde(default)]
    keep_resources: Option<Vec<String>>,
    #[serde(default)]
    delete_resources: Option<Vec<String>>,
    #[serde(default)]
    create_resource: Option<Vec<CreateResourceRule>>,
    #[serde(default)]
    shift_dates: Option<RawShift>,
    #[serde(default)]
    min_date: Option<String>,
    #[serde(default)]
    max_date: Option<String>,
    #[serde(default)]
    execute_script: Option<Vec<RawScript>>,
}

impl TryFrom<RawAction> for Action {
    type Error = String;

    fn try_from(raw: RawAction) -> std::result::Result<Self, Self::Error> {
        let mut kinds = Vec::new();

        if let Some(rules) = raw.profiles {
            kinds.push(ActionKind::ApplyProfiles(rules));
        }
        if let Some(rules) = raw.set_values {
            kinds.push(ActionKind::SetValues(rules));
        }
        if let Some(selectors) = raw.keep_resources {
            kinds.push(ActionKind::KeepResources(selectors));
        }
        if let Some(selectors) = raw.delete_resources {
            kinds.push(ActionKind::DeleteResources(selectors));
        }
        if let Some(rules) = raw.create_resource {
            for rule in &rules {
                validate_based_on(rule)?;
            }
            kinds.push(ActionKind::CreateResource(rules));
        }
        if let Some(shift) = raw.shift_dates {
            let (text, applicability) = match shift {
                RawShift::Amount(text) => (text, None),
                RawShift::Detailed {
                    amount,
                    applicability,
                } => (amount, applicability),
            };
            let amount = ShiftAmount::parse(&text).map_err(|e| e.to_string())?;
            kinds.push(ActionKind::ShiftDates(ShiftDatesRule {
                amount,
                applicability,
            }));
        }
        if raw.min_date.is_some() || raw.max_date.is_some() {
            let range = DateRange::parse(raw.min_date.as_deref(), raw.max_date.as_deref())
                .map_err(|e| e.to_string())?;
            kinds.push(ActionKind::DateFilter(range));
        }
        if let Some(scripts) = raw.execute_script {
            let rules = scripts
                .into_iter()
                .map(ScriptRule::try_from)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            kinds.push(ActionKind::ExecuteScript(rules));
        }

        let label = raw.name.as_deref().unwrap_or("<unnamed>");
        match kinds.len() {
            1 => Ok(Action {
                name: raw.name.clone(),
                kind: kinds.remove(0),
            }),
            0 => Err(format!("action '{label}' has no action key")),
            n => Err(format!(
                "action '{label}' has {n} action keys ({}), expected exactly one",
                kinds
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

fn validate_based_on(rule: &CreateResourceRule) -> std::result::Result<(), String> {
    let Some(based_on) = &rule.based_on else {
        return Ok(());
    };
    match (&based_on.resource, &based_on.module, &based_on.state) {
        (Some(_), None, None) | (None, Some(_), Some(_)) => Ok(()),
        _ => Err(format!(
            "create_resource {}: based_on needs either 'resource' or both 'module' and 'state'",
            rule.resource_type
        )),
    }
}
