//! Plan and order document types.
//!
//! Wire names follow the remote store (`orderDetail`, `memberOrders`,
//! `foodId`, ...). Submitted selections are typed; the stored `orderDetail`
//! stays raw JSON so entries this crate does not write are carried through
//! byte for byte.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::{document_store::Document, Error, Result};

/// Date key (delivery timestamp, as a string) to that date's entry, as stored.
pub type OrderDetail = Map<String, Value>;

/// A participant's participation state for one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemberOrderStatus {
    #[default]
    Empty,
    Joined,
    NotJoined,
}

impl std::fmt::Display for MemberOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Joined => write!(f, "joined"),
            Self::NotJoined => write!(f, "notJoined"),
        }
    }
}

/// One participant's selection for one date, as submitted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberOrder {
    #[serde(default, deserialize_with = "null_as_default")]
    pub food_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_food_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub requirement: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: MemberOrderStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MemberOrder {
    /// A joined selection of `food_id`.
    #[must_use]
    pub fn joined(food_id: impl Into<String>) -> Self {
        Self {
            food_id: food_id.into(),
            status: MemberOrderStatus::Joined,
            ..Self::default()
        }
    }
}

/// View of a plan document: its raw `orderDetail`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlanDocument {
    pub id: String,
    pub order_detail: OrderDetail,
}

impl PlanDocument {
    pub const ORDER_DETAIL: &'static str = "orderDetail";
    pub const MEMBER_ORDERS: &'static str = "memberOrders";

    /// Interpret a store document as a plan. A missing or null `orderDetail`
    /// is an empty plan; anything other than an object is malformed.
    pub fn from_document(doc: &Document) -> Result<Self> {
        let order_detail = match doc.attributes.get(Self::ORDER_DETAIL) {
            None | Some(Value::Null) => OrderDetail::new(),
            Some(Value::Object(detail)) => detail.clone(),
            Some(other) => {
                return Err(Error::MalformedDocument(format!(
                    "plan '{}' orderDetail is not an object: {other}",
                    doc.id
                )))
            }
        };
        Ok(Self {
            id: doc.id.clone(),
            order_detail,
        })
    }

    /// The partial update that replaces `orderDetail` wholesale.
    #[must_use]
    pub fn order_detail_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert(
            Self::ORDER_DETAIL.to_string(),
            Value::Object(self.order_detail.clone()),
        );
        fields
    }
}

/// Typed view of the roster fields of an order document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderDocument {
    pub id: String,
    pub participants: Vec<String>,
    pub anonymous: Vec<String>,
}

impl OrderDocument {
    pub const PARTICIPANTS: &'static str = "participants";
    pub const ANONYMOUS: &'static str = "anonymous";

    pub fn from_document(doc: &Document) -> Result<Self> {
        Ok(Self {
            id: doc.id.clone(),
            participants: roster(doc, Self::PARTICIPANTS)?,
            anonymous: roster(doc, Self::ANONYMOUS)?,
        })
    }

    #[must_use]
    pub fn knows(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id) || self.anonymous.iter().any(|a| a == user_id)
    }
}

fn roster(doc: &Document, field: &str) -> Result<Vec<String>> {
    match doc.attributes.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| Error::MalformedDocument(format!("order '{}' {field}: {e}", doc.id))),
    }
}

/// A participant's contribution, as submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUpdate {
    pub order_id: String,
    pub plan_id: String,
    pub current_user_id: String,
    #[serde(flatten)]
    pub payload: PlanPayload,
}

/// Single-date or multi-date contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlanPayload {
    #[serde(rename_all = "camelCase")]
    SingleDate {
        #[serde(deserialize_with = "date_key")]
        order_day: String,
        member_orders: MemberOrder,
    },
    #[serde(rename_all = "camelCase")]
    MultiDate {
        #[serde(deserialize_with = "date_keys")]
        order_days: Vec<String>,
        #[serde(default)]
        plan_data: BTreeMap<String, Option<MemberOrder>>,
    },
}

impl PlanPayload {
    /// Dates this payload touches.
    #[must_use]
    pub fn dates(&self) -> Vec<&str> {
        match self {
            Self::SingleDate { order_day, .. } => vec![order_day.as_str()],
            Self::MultiDate { order_days, .. } => order_days.iter().map(String::as_str).collect(),
        }
    }

    /// Number of dates in the submitted batch.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        match self {
            Self::SingleDate { .. } => 1,
            Self::MultiDate { order_days, .. } => order_days.len(),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Date keys arrive as strings or as millisecond numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDateKey {
    Text(String),
    Millis(i64),
}

impl From<RawDateKey> for String {
    fn from(raw: RawDateKey) -> Self {
        match raw {
            RawDateKey::Text(s) => s,
            RawDateKey::Millis(n) => n.to_string(),
        }
    }
}

fn date_key<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawDateKey::deserialize(deserializer).map(String::from)
}

fn date_keys<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<RawDateKey>::deserialize(deserializer).map(|keys| keys.into_iter().map(String::from).collect())
}
