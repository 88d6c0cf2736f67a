//! Facet classification: discovers which attribute keys in a search
//! response are "standard" (externally defined) or "common" (frequently
//! populated).
//!
//! Pure functions over the response JSON; fetching is the client's job.

use serde_json::Value;

/// Key holding the raw result records in a search response.
pub const RESULTS_KEY: &str = "oc-api:has-results";

/// Key holding the facet descriptions in a search response.
pub const FACETS_KEY: &str = "oc-api:has-facets";

/// Repeatable `prop` value that surfaces the standard Von den Driesch
/// bone measurement attributes, which are otherwise buried in the API.
pub const VON_DEN_DRIESCH_PROP: &str =
    "oc-zoo-anatomical-meas---oc-zoo-von-den-driesch-bone-meas";

const DEFINED_BY_KEY: &str = "rdfs:isDefinedBy";

/// Recognized facet option-group keys. The numeric group is on its way
/// out of the API; the boolean/integer/float/date groups are its
/// replacements and are checked alongside it.
const FACET_OPTION_KEYS: [&str; 7] = [
    "oc-api:has-id-options",
    "oc-api:has-text-options",
    "oc-api:has-numeric-options",
    "oc-api:has-boolean-options",
    "oc-api:has-integer-options",
    "oc-api:has-float-options",
    "oc-api:has-date-options",
];

/// Definition URIs under these prefixes are Open Context's own
/// vocabulary, not external standards.
const RESERVED_DEFINITION_PREFIXES: [&str; 3] =
    ["oc-gen:", "oc-api:", "http://opencontext.org"];

/// Linked-data facet-property classification: always standard.
const LINKED_DATA_FACET_PREFIX: &str = "oc-api:facet-prop-ld";

/// Open Context's own zooarchaeology vocabulary: treated as standard
/// despite living under the service's domain.
const ZOOARCH_VOCABULARY_PREFIX: &str =
    "http://opencontext.org/vocabularies/open-context-zooarch/";

/// Project-variable facet classification, eligible for common attributes.
const PROJECT_VARIABLE_FACET: &str = "oc-api:facet-prop-var";

/// Namespace of project-defined predicates (descriptive attributes).
const PREDICATES_NAMESPACE: &str = "http://opencontext.org/predicates/";

/// Biological taxonomies sit in deep hierarchies; their slugs are never
/// attribute slugs.
const NON_ATTRIBUTE_SLUG_PREFIXES: [&str; 2] = ["gbif-", "eol-p-"];

/// One attribute discovered from a facet: a stable slug plus its
/// human-readable label.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Attribute {
    pub slug: String,
    pub label: String,
}

/// Attributes defined outside Open Context's internal vocabulary, or
/// from a recognized vocabulary namespace. Empty when the result set is
/// empty. Deduplicated by (slug, label), first-seen order.
pub fn standard_attributes(response: &Value) -> Vec<Attribute> {
    let mut attributes = Vec::new();
    if total_results(response) < 1 {
        return attributes;
    }
    for facet in facet_list(response) {
        let Some(def_uri) = facet.get(DEFINED_BY_KEY).and_then(Value::as_str) else {
            continue;
        };
        if !is_standard_definition(def_uri) {
            continue;
        }
        for key in FACET_OPTION_KEYS {
            let Some(options) = facet.get(key).and_then(Value::as_array) else {
                continue;
            };
            for option in options {
                let Some(attribute) = option_attribute(option) else {
                    continue;
                };
                if NON_ATTRIBUTE_SLUG_PREFIXES
                    .iter()
                    .any(|prefix| attribute.slug.starts_with(prefix))
                {
                    continue;
                }
                if !attributes.contains(&attribute) {
                    attributes.push(attribute);
                }
            }
        }
    }
    attributes
}

/// Project-defined attributes whose occurrence count meets or exceeds
/// `totalResults * min_portion`. A count exactly at the threshold is
/// included.
pub fn common_attributes(response: &Value, min_portion: f64) -> Vec<Attribute> {
    let mut attributes = Vec::new();
    let total = total_results(response);
    if total < 1 {
        return attributes;
    }
    let threshold = total as f64 * min_portion;

    for facet in facet_list(response) {
        let def_uri = facet
            .get(DEFINED_BY_KEY)
            .and_then(Value::as_str)
            .unwrap_or("");
        if def_uri != PROJECT_VARIABLE_FACET && !def_uri.starts_with(PREDICATES_NAMESPACE) {
            continue;
        }
        for key in FACET_OPTION_KEYS {
            let Some(options) = facet.get(key).and_then(Value::as_array) else {
                continue;
            };
            for option in options {
                let Some(attribute) = option_attribute(option) else {
                    continue;
                };
                let is_predicate = option
                    .get(DEFINED_BY_KEY)
                    .and_then(Value::as_str)
                    .is_some_and(|uri| uri.starts_with(PREDICATES_NAMESPACE));
                if !is_predicate {
                    continue;
                }
                let count = option.get("count").and_then(Value::as_f64).unwrap_or(0.0);
                if count < threshold {
                    continue;
                }
                if !attributes.contains(&attribute) {
                    attributes.push(attribute);
                }
            }
        }
    }
    attributes
}

/// A definition URI is standard when it is external to Open Context, or
/// is the linked-data facet classification, or sits in the zooarchaeology
/// vocabulary.
fn is_standard_definition(def_uri: &str) -> bool {
    if def_uri.starts_with(LINKED_DATA_FACET_PREFIX)
        || def_uri.starts_with(ZOOARCH_VOCABULARY_PREFIX)
    {
        return true;
    }
    !RESERVED_DEFINITION_PREFIXES
        .iter()
        .any(|prefix| def_uri.starts_with(prefix))
}

fn total_results(response: &Value) -> u64 {
    response
        .get("totalResults")
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

fn facet_list(response: &Value) -> &[Value] {
    response
        .get(FACETS_KEY)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn option_attribute(option: &Value) -> Option<Attribute> {
    let slug = option.get("slug").and_then(Value::as_str)?;
    let label = option.get("label").and_then(Value::as_str)?;
    if slug.is_empty() || label.is_empty() {
        return None;
    }
    Some(Attribute {
        slug: slug.to_string(),
        label: label.to_string(),
    })
}
