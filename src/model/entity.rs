//! Entity records synchronized between the device and the server.
//!
//! The sync engine treats records as opaque keyed documents: an `id`, an
//! `is_active` soft-delete flag and arbitrary fields. [`EntityPayload`] is the
//! typed view used for queued mutations, one variant per entity type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::Error;

/// Business record types synchronized with the server.
///
/// Each variant maps 1:1 to a local table and a remote table of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Debtors,
    Credits,
    Collaterals,
    Notifications,
    Users,
}

impl EntityType {
    /// All entity types, in download order.
    pub const ALL: [Self; 5] = [
        Self::Debtors,
        Self::Credits,
        Self::Collaterals,
        Self::Notifications,
        Self::Users,
    ];

    /// Table name, locally and on the server.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Debtors => "debtors",
            Self::Credits => "credits",
            Self::Collaterals => "collaterals",
            Self::Notifications => "notifications",
            Self::Users => "users",
        }
    }

    /// Fields with a secondary index in the local store.
    ///
    /// Only these can be used with `LocalStore::find_by`.
    #[must_use]
    pub const fn index_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Debtors => &["code", "name"],
            Self::Credits => &["debtor_id", "status", "start_date"],
            Self::Collaterals => &["credit_id"],
            Self::Notifications => &["user_id", "is_read", "created_at"],
            Self::Users => &["email", "role"],
        }
    }

    /// Whether `field` is a declared index field.
    #[must_use]
    pub fn has_index(&self, field: &str) -> bool {
        self.index_fields().contains(&field)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

impl std::str::FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debtors" | "debtor" => Ok(Self::Debtors),
            "credits" | "credit" => Ok(Self::Credits),
            "collaterals" | "collateral" => Ok(Self::Collaterals),
            "notifications" | "notification" => Ok(Self::Notifications),
            "users" | "user" => Ok(Self::Users),
            _ => Err(Error::UnknownEntityType { name: s.to_string() }),
        }
    }
}

fn default_true() -> bool {
    true
}

/// A typed field that may be absent, explicitly `null`, or set.
///
/// `None` is omitted on serialize; `Some(None)` is written as `null` so a
/// cleared column reaches the server.
pub type Nullable<T> = Option<Option<T>>;

fn nullable<'de, D, T>(deserializer: D) -> Result<Nullable<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A stored entity record.
///
/// Everything besides `id` and `is_active` is carried in `fields` untouched.
/// Records with `is_active = false` are soft-deleted: kept for bookkeeping,
/// never listed as live data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create an active record with no fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_active: true,
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Builder-style soft-delete flag.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Look up a field by name. `id` and `is_active` are included.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            "id" => Some(Value::String(self.id.clone())),
            "is_active" => Some(Value::Bool(self.is_active)),
            _ => self.fields.get(key).cloned(),
        }
    }

    /// SHA256 hex digest of the canonical JSON form.
    ///
    /// `serde_json::Map` keeps keys sorted, so equal records hash equally.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

// ── Typed entity shapes ───────────────────────────────────────

/// A debtor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debtor {
    pub id: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub code: Nullable<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub name: Nullable<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A credit granted to a debtor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credit {
    pub id: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub debtor_id: Nullable<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub status: Nullable<String>,
    /// ISO date (`YYYY-MM-DD`).
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub start_date: Nullable<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Collateral backing a credit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collateral {
    pub id: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub credit_id: Nullable<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A user-facing notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub user_id: Nullable<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub is_read: Nullable<bool>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub created_at: Nullable<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An application user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub email: Nullable<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub role: Nullable<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Typed mutation payload, discriminated by entity type.
///
/// Serializes as `{"entity_type":"debtors","data":{...}}` so the queue
/// table stays physically uniform while each variant keeps its own shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_type", content = "data", rename_all = "snake_case")]
pub enum EntityPayload {
    Debtors(Debtor),
    Credits(Credit),
    Collaterals(Collateral),
    Notifications(Notification),
    Users(User),
}

impl EntityPayload {
    /// The entity type of this payload.
    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        match self {
            Self::Debtors(_) => EntityType::Debtors,
            Self::Credits(_) => EntityType::Credits,
            Self::Collaterals(_) => EntityType::Collaterals,
            Self::Notifications(_) => EntityType::Notifications,
            Self::Users(_) => EntityType::Users,
        }
    }

    /// Identifier of the entity this payload describes.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Debtors(e) => &e.id,
            Self::Credits(e) => &e.id,
            Self::Collaterals(e) => &e.id,
            Self::Notifications(e) => &e.id,
            Self::Users(e) => &e.id,
        }
    }

    /// The inner entity as a JSON value (without the type tag).
    ///
    /// # Errors
    ///
    /// Returns an error if the entity cannot be serialized.
    pub fn data(&self) -> serde_json::Result<Value> {
        match self {
            Self::Debtors(e) => serde_json::to_value(e),
            Self::Credits(e) => serde_json::to_value(e),
            Self::Collaterals(e) => serde_json::to_value(e),
            Self::Notifications(e) => serde_json::to_value(e),
            Self::Users(e) => serde_json::to_value(e),
        }
    }

    /// Convert to an opaque storage record.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity cannot be serialized.
    pub fn to_record(&self) -> serde_json::Result<Record> {
        serde_json::from_value(self.data()?)
    }

    /// Build a typed payload from raw entity JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` does not fit the entity's shape
    /// (missing `id`, or a typed index field of the wrong JSON type).
    pub fn from_data(entity_type: EntityType, data: Value) -> serde_json::Result<Self> {
        Ok(match entity_type {
            EntityType::Debtors => Self::Debtors(serde_json::from_value(data)?),
            EntityType::Credits => Self::Credits(serde_json::from_value(data)?),
            EntityType::Collaterals => Self::Collaterals(serde_json::from_value(data)?),
            EntityType::Notifications => Self::Notifications(serde_json::from_value(data)?),
            EntityType::Users => Self::Users(serde_json::from_value(data)?),
        })
    }

    /// Build a typed payload from a storage record.
    ///
    /// # Errors
    ///
    /// See [`EntityPayload::from_data`].
    pub fn from_record(entity_type: EntityType, record: &Record) -> serde_json::Result<Self> {
        Self::from_data(entity_type, serde_json::to_value(record)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_type_round_trips_through_str() {
        for entity_type in EntityType::ALL {
            let parsed: EntityType = entity_type.to_string().parse().unwrap();
            assert_eq!(parsed, entity_type);
        }
        assert!("loans".parse::<EntityType>().is_err());
        assert_eq!("debtor".parse::<EntityType>().unwrap(), EntityType::Debtors);
    }

    #[test]
    fn test_record_defaults_to_active() {
        let record: Record = serde_json::from_value(json!({"id": "D1", "code": "C-1"})).unwrap();
        assert!(record.is_active);
        assert_eq!(record.field("code"), Some(json!("C-1")));
        assert_eq!(record.field("id"), Some(json!("D1")));
    }

    #[test]
    fn test_record_flattens_fields() {
        let record = Record::new("C1").with_field("amount", 1200).inactive();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, json!({"id": "C1", "is_active": false, "amount": 1200}));
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = Record::new("D1").with_field("b", 2).with_field("a", 1);
        let b = Record::new("D1").with_field("a", 1).with_field("b", 2);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), a.clone().inactive().content_hash());
    }

    #[test]
    fn test_payload_is_tagged_by_entity_type() {
        let payload = EntityPayload::from_data(
            EntityType::Credits,
            json!({"id": "CR1", "debtor_id": "D1", "amount": 500}),
        )
        .unwrap();

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["entity_type"], "credits");
        assert_eq!(value["data"]["debtor_id"], "D1");
        assert_eq!(value["data"]["amount"], 500);

        let back: EntityPayload = serde_json::from_value(value).unwrap();
        assert_eq!(back, payload);
        assert_eq!(back.id(), "CR1");
    }

    #[test]
    fn test_payload_rejects_wrong_index_type() {
        let result = EntityPayload::from_data(EntityType::Debtors, json!({"id": "D1", "code": 7}));
        assert!(result.is_err());
    }

    #[test]
    fn test_payload_record_conversion_keeps_extra_fields() {
        let record = Record::new("U1")
            .with_field("email", "ana@example.com")
            .with_field("phone", "555");
        let payload = EntityPayload::from_record(EntityType::Users, &record).unwrap();
        match &payload {
            EntityPayload::Users(user) => {
                assert_eq!(user.email, Some(Some("ana@example.com".to_string())));
                assert_eq!(user.extra.get("phone"), Some(&json!("555")));
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(payload.to_record().unwrap(), record);
    }

    #[test]
    fn test_payload_keeps_explicit_null() {
        let cleared = EntityPayload::from_data(EntityType::Debtors, json!({"id": "D1", "code": null}))
            .unwrap();
        assert_eq!(cleared.data().unwrap(), json!({"id": "D1", "is_active": true, "code": null}));
        assert_eq!(cleared.to_record().unwrap().field("code"), Some(Value::Null));

        let absent = EntityPayload::from_data(EntityType::Debtors, json!({"id": "D1"})).unwrap();
        assert_eq!(absent.data().unwrap(), json!({"id": "D1", "is_active": true}));
    }
}
