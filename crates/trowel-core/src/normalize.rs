//! Record normalization: flattens one raw API record into a mapping of
//! column name to scalar value.
//!
//! Open Context allows record attributes to carry multiple values, which
//! is how data contributors often describe their observations but is a
//! pain for tabular analysis. Multi-valued attributes are resolved by a
//! [`MultiValuePolicy`]; hierarchical context paths are split into one
//! column per depth level.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::config::ClientConfig;
use crate::error::AppError;

/// Default delimiter for the concat policy.
pub const DEFAULT_MULTI_VALUE_DELIM: &str = "; ";

/// Attribute key carrying the hierarchical context path.
pub const CONTEXT_KEY: &str = "context label";

/// Column name for one level of context depth, 1-based.
pub fn context_column(depth: usize) -> String {
    format!("Context ({depth})")
}

/// A flat record: column name to scalar (or boolean presence flag).
pub type NormalizedRecord = BTreeMap<String, Value>;

/// How to resolve a multi-valued attribute into tabular columns.
#[derive(Debug, Clone, PartialEq)]
pub enum MultiValuePolicy {
    /// Keep only the first element.
    First,
    /// Keep only the last element.
    Last,
    /// Serialize the full list as a JSON string value.
    Json,
    /// Join all elements with the carried delimiter into one string.
    Concat(String),
    /// One `"{key} :: {element}"` column per element, valued `true`.
    ColumnVal,
}

impl MultiValuePolicy {
    /// Parse a policy from its configuration name. `delim` is carried by
    /// the concat policy and ignored by the others.
    pub fn parse(name: &str, delim: &str) -> Result<Self, AppError> {
        match name {
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            "json" => Ok(Self::Json),
            "concat" => Ok(Self::Concat(delim.to_string())),
            "column_val" => Ok(Self::ColumnVal),
            other => Err(AppError::Configuration(format!(
                "unknown multi-value policy '{other}' \
                 (expected one of: first, last, json, concat, column_val)"
            ))),
        }
    }
}

/// Normalizes raw records against one configuration, tracking the maximum
/// context depth seen so the table assembler can order context columns.
pub struct Normalizer<'a> {
    config: &'a ClientConfig,
    max_context_depth: usize,
}

impl<'a> Normalizer<'a> {
    pub fn new(config: &'a ClientConfig) -> Self {
        Self {
            config,
            max_context_depth: 0,
        }
    }

    /// Deepest context path seen across all records normalized so far.
    pub fn max_context_depth(&self) -> usize {
        self.max_context_depth
    }

    /// Flatten one raw record into a [`NormalizedRecord`].
    pub fn normalize(&mut self, raw: &Map<String, Value>) -> NormalizedRecord {
        let mut record = NormalizedRecord::new();
        for (key, value) in raw {
            if key == CONTEXT_KEY {
                // Contexts are single-valued but hierarchical: split the
                // path into one column per depth level.
                if let Some(path) = value.as_str() {
                    let parts: Vec<&str> = path.split('/').collect();
                    if parts.len() > self.max_context_depth {
                        self.max_context_depth = parts.len();
                    }
                    for (i, part) in parts.iter().enumerate() {
                        record.insert(context_column(i + 1), Value::from(*part));
                    }
                }
                continue;
            }

            if let Some(policy) = self.config.policy_overrides.get(key) {
                let values = as_value_list(value);
                apply_policy(policy, key, &values, &mut record);
                continue;
            }

            let Some(list) = value.as_array() else {
                // Single value, copy through unchanged.
                record.insert(key.clone(), value.clone());
                continue;
            };

            // No override for this key: numeric and non-numeric lists can
            // have different configured handling.
            let numbers: Option<Vec<f64>> = list.iter().map(parse_number).collect();
            match numbers {
                Some(numbers) => {
                    let values: Vec<Value> = numbers.into_iter().map(number_value).collect();
                    apply_policy(&self.config.numeric_policy, key, &values, &mut record);
                }
                None => apply_policy(&self.config.non_numeric_policy, key, list, &mut record),
            }
        }
        record
    }
}

fn apply_policy(
    policy: &MultiValuePolicy,
    key: &str,
    values: &[Value],
    record: &mut NormalizedRecord,
) {
    if values.is_empty() {
        return;
    }
    match policy {
        MultiValuePolicy::First => {
            record.insert(key.to_string(), values[0].clone());
        }
        MultiValuePolicy::Last => {
            record.insert(key.to_string(), values[values.len() - 1].clone());
        }
        MultiValuePolicy::Json => {
            let rendered = Value::Array(values.to_vec()).to_string();
            record.insert(key.to_string(), Value::String(rendered));
        }
        MultiValuePolicy::Concat(delim) => {
            let joined = values
                .iter()
                .map(value_to_string)
                .collect::<Vec<_>>()
                .join(delim);
            record.insert(key.to_string(), Value::String(joined));
        }
        MultiValuePolicy::ColumnVal => {
            for value in values {
                let column = format!("{key} :: {}", value_to_string(value));
                record.insert(column, Value::Bool(true));
            }
        }
    }
}

/// Render a scalar for joining or column naming. Strings pass through
/// without quoting.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_value_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(list) => list.clone(),
        other => vec![other.clone()],
    }
}

fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() <= i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn normalize_with(config: &ClientConfig, value: Value) -> NormalizedRecord {
        Normalizer::new(config).normalize(&raw(value))
    }

    #[test]
    fn concat_joins_with_delimiter() {
        let config = ClientConfig::default()
            .with_non_numeric_policy(MultiValuePolicy::Concat("; ".into()));
        let record = normalize_with(&config, json!({"material": ["bone", "shell"]}));
        assert_eq!(record["material"], json!("bone; shell"));
    }

    #[test]
    fn column_val_encodes_presence() {
        let config = ClientConfig::default()
            .with_policy_override("material", MultiValuePolicy::ColumnVal);
        let record = normalize_with(&config, json!({"material": ["bone", "shell"]}));
        assert_eq!(record["material :: bone"], json!(true));
        assert_eq!(record["material :: shell"], json!(true));
        assert!(!record.contains_key("material"));
    }

    #[test]
    fn first_keeps_first_element() {
        let config =
            ClientConfig::default().with_policy_override("material", MultiValuePolicy::First);
        let record = normalize_with(&config, json!({"material": ["bone", "shell"]}));
        assert_eq!(record["material"], json!("bone"));
    }

    #[test]
    fn last_keeps_last_element() {
        let config =
            ClientConfig::default().with_policy_override("material", MultiValuePolicy::Last);
        let record = normalize_with(&config, json!({"material": ["bone", "shell"]}));
        assert_eq!(record["material"], json!("shell"));
    }

    #[test]
    fn json_policy_serializes_full_list() {
        let config =
            ClientConfig::default().with_policy_override("material", MultiValuePolicy::Json);
        let record = normalize_with(&config, json!({"material": ["bone", "shell"]}));
        assert_eq!(record["material"], json!(r#"["bone","shell"]"#));
    }

    #[test]
    fn unknown_policy_name_is_a_configuration_error() {
        let err = MultiValuePolicy::parse("xyz", "; ").unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(err.to_string().contains("xyz"));
    }

    #[test]
    fn known_policy_names_parse() {
        assert_eq!(
            MultiValuePolicy::parse("first", "; ").unwrap(),
            MultiValuePolicy::First
        );
        assert_eq!(
            MultiValuePolicy::parse("concat", " / ").unwrap(),
            MultiValuePolicy::Concat(" / ".into())
        );
        assert_eq!(
            MultiValuePolicy::parse("column_val", "; ").unwrap(),
            MultiValuePolicy::ColumnVal
        );
    }

    #[test]
    fn context_path_splits_into_depth_columns() {
        let config = ClientConfig::default();
        let mut normalizer = Normalizer::new(&config);
        let record =
            normalizer.normalize(&raw(json!({"context label": "Site/Trench/Locus"})));
        assert_eq!(record["Context (1)"], json!("Site"));
        assert_eq!(record["Context (2)"], json!("Trench"));
        assert_eq!(record["Context (3)"], json!("Locus"));
        assert_eq!(normalizer.max_context_depth(), 3);
    }

    #[test]
    fn max_context_depth_tracks_deepest_record() {
        let config = ClientConfig::default();
        let mut normalizer = Normalizer::new(&config);
        normalizer.normalize(&raw(json!({"context label": "Site/Trench"})));
        normalizer.normalize(&raw(json!({"context label": "Site/Trench/Locus/Lot"})));
        normalizer.normalize(&raw(json!({"context label": "Site"})));
        assert_eq!(normalizer.max_context_depth(), 4);
    }

    #[test]
    fn single_values_copy_through() {
        let config = ClientConfig::default();
        let record = normalize_with(&config, json!({"label": "Bone 12", "count": 3}));
        assert_eq!(record["label"], json!("Bone 12"));
        assert_eq!(record["count"], json!(3));
    }

    #[test]
    fn all_numeric_list_uses_numeric_default_policy() {
        // Default numeric policy is First; elements given as strings still
        // count as numeric when they all parse.
        let config = ClientConfig::default();
        let record = normalize_with(&config, json!({"measure": ["2", "3.5"]}));
        assert_eq!(record["measure"], json!(2));
    }

    #[test]
    fn mixed_list_uses_non_numeric_default_policy() {
        let config = ClientConfig::default();
        let record = normalize_with(&config, json!({"notes": ["2", "fragmentary"]}));
        assert_eq!(record["notes"], json!("2; fragmentary"));
    }

    #[test]
    fn override_wraps_scalar_values() {
        let config =
            ClientConfig::default().with_policy_override("fusion", MultiValuePolicy::ColumnVal);
        let record = normalize_with(&config, json!({"fusion": "distal"}));
        assert_eq!(record["fusion :: distal"], json!(true));
    }

    #[test]
    fn empty_list_emits_no_column() {
        let config = ClientConfig::default();
        let record = normalize_with(&config, json!({"material": []}));
        assert!(record.is_empty());
    }
}
