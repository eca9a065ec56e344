//! Name → identifier resolution for ranches and crop types
//!
//! CropManage addresses ranches either by an integer `Id` or by an external
//! GUID, and the listing endpoints are not consistent about which fields they
//! fill in. Resolution is tolerant: it returns whatever identifiers the matching
//! entity carries and leaves the choice of endpoint to the caller.

use serde_json::Value;

const NAME_KEYS: &[&str] = &["Name", "name"];
const ID_KEYS: &[&str] = &["Id", "CropTypeId", "RanchId", "id"];
const GUID_KEYS: &[&str] = &["Ranch_External_GUID", "ExternalGuid", "Guid"];

/// A ranch or crop type as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamedEntity {
    pub name: String,
    pub numeric_id: Option<i64>,
    pub external_guid: Option<String>,
}

impl NamedEntity {
    /// Read one listing entry. Entries without a name are skipped.
    pub fn from_json(value: &Value) -> Option<Self> {
        let name = first_str(value, NAME_KEYS)?;
        Some(Self {
            name: name.to_string(),
            numeric_id: ID_KEYS.iter().find_map(|k| value.get(*k).and_then(as_id)),
            external_guid: first_str(value, GUID_KEYS).map(str::to_string),
        })
    }
}

/// Parse a listing response into entities, ignoring anything unrecognizable.
pub fn entities_from_listing(value: &Value) -> Vec<NamedEntity> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(NamedEntity::from_json).collect())
        .unwrap_or_default()
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn as_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Identifiers found for a free-text name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    pub numeric_id: Option<i64>,
    pub external_guid: Option<String>,
    pub found: bool,
}

impl Resolution {
    pub fn not_found() -> Self {
        Self::default()
    }

    /// Something the endpoint chain can address.
    pub fn is_addressable(&self) -> bool {
        self.numeric_id.is_some() || self.external_guid.is_some()
    }
}

impl From<&NamedEntity> for Resolution {
    fn from(entity: &NamedEntity) -> Self {
        Self {
            numeric_id: entity.numeric_id,
            external_guid: entity.external_guid.clone(),
            found: true,
        }
    }
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// First candidate whose normalized name equals the normalized query.
///
/// Exact match only; fuzzy matching belongs to intent parsing.
pub fn resolve<'a, I>(name: &str, candidates: I) -> Resolution
where
    I: IntoIterator<Item = &'a NamedEntity>,
{
    let target = normalize_name(name);
    if target.is_empty() {
        return Resolution::not_found();
    }
    candidates
        .into_iter()
        .find(|c| normalize_name(&c.name) == target)
        .map(Resolution::from)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pryor() -> Vec<NamedEntity> {
        entities_from_listing(&json!([
            {"Name": "Salinas Block 4", "Id": 7},
            {"Name": "Pryor Ranch", "Id": 12, "Ranch_External_GUID": "g-99"}
        ]))
    }

    #[test]
    fn test_case_and_whitespace_variants_resolve_identically() {
        let ranches = pryor();
        let expected = Resolution {
            numeric_id: Some(12),
            external_guid: Some("g-99".into()),
            found: true,
        };
        for query in ["Pryor Ranch", "pryor ranch", "  PRYOR RANCH  ", "\tpRyOr RaNcH\n"] {
            assert_eq!(resolve(query, &ranches), expected, "query {:?}", query);
        }
    }

    #[test]
    fn test_miss_is_not_an_error() {
        let res = resolve("Watsonville", &pryor());
        assert!(!res.found);
        assert_eq!(res.numeric_id, None);
        assert_eq!(res.external_guid, None);
    }

    #[test]
    fn test_empty_query_never_matches() {
        let ranches = vec![NamedEntity {
            name: "   ".into(),
            numeric_id: Some(1),
            external_guid: None,
        }];
        assert!(!resolve("", &ranches).found);
    }

    #[test]
    fn test_match_is_exact_not_fuzzy() {
        assert!(!resolve("Pryor", &pryor()).found);
        assert!(!resolve("Pryor Ranch East", &pryor()).found);
    }

    #[test]
    fn test_first_match_wins() {
        let ranches = entities_from_listing(&json!([
            {"Name": "Home", "Id": 1},
            {"Name": "home", "Id": 2}
        ]));
        assert_eq!(resolve("HOME", &ranches).numeric_id, Some(1));
    }

    #[test]
    fn test_partial_identifiers_are_returned() {
        let ranches = entities_from_listing(&json!([
            {"Name": "Guid Only", "Ranch_External_GUID": "g-1"},
            {"Name": "Id Only", "Id": "31"}
        ]));
        let guid_only = resolve("guid only", &ranches);
        assert!(guid_only.found);
        assert_eq!(guid_only.numeric_id, None);
        assert_eq!(guid_only.external_guid.as_deref(), Some("g-1"));

        let id_only = resolve("id only", &ranches);
        assert_eq!(id_only.numeric_id, Some(31));
        assert_eq!(id_only.external_guid, None);
    }

    #[test]
    fn test_crop_type_id_field_variant() {
        let crops = entities_from_listing(&json!([
            {"Name": "Lettuce", "CropTypeId": 5},
            {"name": "Strawberry", "id": 9},
            {"Id": 3}
        ]));
        assert_eq!(crops.len(), 2);
        assert_eq!(resolve("lettuce", &crops).numeric_id, Some(5));
        assert_eq!(resolve("strawberry", &crops).numeric_id, Some(9));
    }

    #[test]
    fn test_blank_guid_is_absent() {
        let entity = NamedEntity::from_json(&json!({"Name": "X", "Ranch_External_GUID": "  "})).unwrap();
        assert_eq!(entity.external_guid, None);
        assert!(!Resolution::from(&entity).is_addressable());
    }

    #[test]
    fn test_non_array_listing_is_empty() {
        assert!(entities_from_listing(&json!({"Message": "Authorization has been denied"})).is_empty());
    }
}
