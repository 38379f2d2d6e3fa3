//! Grouping identity extraction from commune feature properties.

use std::fmt;

use geojson::{JsonObject, JsonValue};

use crate::error::SchemaError;

/// Properties that identify an EPCI. Output features carry exactly these.
pub const IDENTITY_FIELDS: [&str; 7] = [
    "code_epci",
    "annee",
    "epci",
    "code_region",
    "code_departement",
    "region",
    "departement",
];

/// Per-commune properties dropped before grouping.
pub const EXCLUDED_FIELDS: [&str; 3] = ["commune", "code_commune", "geo_point_2d"];

/// The seven identity values of one EPCI, in `IDENTITY_FIELDS` order.
///
/// Values keep their JSON type, so a numeric `code_region` stays numeric
/// in the output. Two identities are equal only if all seven values are.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupingIdentity {
    values: [JsonValue; 7],
}

impl GroupingIdentity {
    pub fn from_properties(properties: Option<&JsonObject>) -> Result<Self, SchemaError> {
        let properties = properties.ok_or(SchemaError::MissingProperties)?;

        let mut values: [JsonValue; 7] = Default::default();
        for (slot, field) in values.iter_mut().zip(IDENTITY_FIELDS) {
            *slot = properties
                .get(field)
                .cloned()
                .ok_or(SchemaError::MissingField(field))?;
        }

        Ok(GroupingIdentity { values })
    }

    pub fn code(&self) -> &JsonValue {
        &self.values[0]
    }

    pub fn year(&self) -> &JsonValue {
        &self.values[1]
    }

    pub fn name(&self) -> &JsonValue {
        &self.values[2]
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        IDENTITY_FIELDS
            .iter()
            .position(|f| *f == field)
            .map(|i| &self.values[i])
    }

    /// Identity fields as an output properties object.
    pub fn to_properties(&self) -> JsonObject {
        IDENTITY_FIELDS
            .iter()
            .zip(self.values.iter())
            .map(|(field, value)| (field.to_string(), value.clone()))
            .collect()
    }

    pub fn key(&self) -> GroupingKey {
        GroupingKey {
            code: as_text(self.code()),
            year: as_text(self.year()),
            canonical: JsonValue::Array(self.values.to_vec()).to_string(),
        }
    }
}

/// Property names that are neither identity fields nor excluded commune fields.
pub fn unexpected_fields(properties: &JsonObject) -> impl Iterator<Item = &str> {
    properties
        .keys()
        .map(String::as_str)
        .filter(|name| !IDENTITY_FIELDS.contains(name) && !EXCLUDED_FIELDS.contains(name))
}

/// Stringified identity used as the registry key.
///
/// Ordered by grouping code, then year, then the canonical rendering of all
/// identity values, which also makes key equality match identity equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupingKey {
    code: String,
    year: String,
    canonical: String,
}

impl GroupingKey {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn year(&self) -> &str {
        &self.year
    }
}

impl fmt::Display for GroupingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) {}", self.code, self.year, self.canonical)
    }
}

fn as_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
