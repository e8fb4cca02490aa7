//! Merge engine (pure domain logic).
//!
//! Folds one participant's contribution into a freshly read `orderDetail`.
//! No IO, no async: the worker reads under the lock, calls into here, and
//! writes the result back.
//!
//! # Rules
//!
//! - Only `memberOrders[current_user_id]` is written, for each touched date.
//!   Other participants' entries and every other field are never re-encoded.
//! - Missing (or null) date entries and `memberOrders` maps are created on
//!   first write.
//! - In a multi-date batch, a date whose value is missing or `null` is skipped
//!   so a partial batch never erases other dates.
//! - Everything else in the document is left exactly as read.

use serde_json::{Map, Value};

use crate::{
    model::{MemberOrder, OrderDetail, OrderDocument, PlanDocument, PlanPayload},
    Error, Result,
};

/// What a merge changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Dates whose entry for the participant was written.
    pub written: Vec<String>,
    /// Dates listed in a batch but carrying no value.
    pub skipped: Vec<String>,
}

/// Apply `payload` for `user_id` to `order_detail` in place.
pub fn apply_contribution(
    order_detail: &mut OrderDetail,
    user_id: &str,
    payload: &PlanPayload,
) -> Result<MergeOutcome> {
    if user_id.trim().is_empty() {
        return Err(Error::MergeInvariantViolation(
            "current user id cannot be blank".to_string(),
        ));
    }

    let mut outcome = MergeOutcome::default();
    match payload {
        PlanPayload::SingleDate {
            order_day,
            member_orders,
        } => {
            upsert_member_order(order_detail, order_day, user_id, member_orders)?;
            outcome.written.push(order_day.clone());
        }
        PlanPayload::MultiDate {
            order_days,
            plan_data,
        } => {
            for day in order_days {
                match plan_data.get(day).and_then(Option::as_ref) {
                    Some(member_order) => {
                        upsert_member_order(order_detail, day, user_id, member_order)?;
                        outcome.written.push(day.clone());
                    }
                    None => outcome.skipped.push(day.clone()),
                }
            }
        }
    }
    Ok(outcome)
}

fn upsert_member_order(
    order_detail: &mut OrderDetail,
    day: &str,
    user_id: &str,
    member_order: &MemberOrder,
) -> Result<()> {
    if day.trim().is_empty() {
        return Err(Error::MergeInvariantViolation(
            "date key cannot be blank".to_string(),
        ));
    }
    let entry = object_slot(order_detail, day, || format!("date entry '{day}'"))?;
    let member_orders = object_slot(entry, PlanDocument::MEMBER_ORDERS, || {
        format!("memberOrders of date '{day}'")
    })?;
    member_orders.insert(user_id.to_string(), serde_json::to_value(member_order)?);
    Ok(())
}

/// The object stored under `key`, created empty when missing or null.
fn object_slot<'a>(
    map: &'a mut Map<String, Value>,
    key: &str,
    describe: impl FnOnce() -> String,
) -> Result<&'a mut Map<String, Value>> {
    let slot = map.entry(key.to_string()).or_insert(Value::Null);
    if slot.is_null() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(object) => Ok(object),
        other => Err(Error::MalformedDocument(format!(
            "{} is not an object: {other}",
            describe()
        ))),
    }
}

/// The anonymous roster with `user_id` added, or `None` when the user is
/// already on either roster. Set-union: never introduces duplicates.
#[must_use]
pub fn roster_with_anonymous(order: &OrderDocument, user_id: &str) -> Option<Vec<String>> {
    if order.knows(user_id) {
        return None;
    }
    let mut anonymous: Vec<String> = Vec::with_capacity(order.anonymous.len() + 1);
    for id in order.anonymous.iter().map(String::as_str).chain(std::iter::once(user_id)) {
        if !anonymous.iter().any(|a| a == id) {
            anonymous.push(id.to_string());
        }
    }
    Some(anonymous)
}
