//! Schema normalizer - the single conversion boundary for stored records
//!
//! Plans have been written in several historical shapes: `sharedWith` as a
//! map of email -> bool, or as an array of emails; the owner id as `userId`
//! or `ownerUserId`. Everything read from the store passes through here and
//! comes out in the canonical shape (array-shaped `sharedWith`). Normalizing
//! already-normalized data is a no-op.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::domain::meal::{self, fields as meal_fields};
use crate::domain::plan::{canonical_email, fields as plan_fields};
use crate::domain::{Meal, MealCategory, Plan, SharedWith, User, ValidationError};
use crate::ports::StoredDocument;

/// Coerce any historical `sharedWith` shape into the canonical collection
///
/// - map: keys whose value is exactly `true` are kept, everything else dropped
/// - array: string entries kept, deduplicated
pub fn coerce_shared_with(value: &JsonValue) -> Result<SharedWith, ValidationError> {
    match value {
        JsonValue::Object(map) => Ok(SharedWith::from_emails(
            map.iter()
                .filter(|(_, v)| **v == JsonValue::Bool(true))
                .map(|(k, _)| k.as_str()),
        )),
        JsonValue::Array(items) => Ok(SharedWith::from_emails(
            items.iter().filter_map(JsonValue::as_str),
        )),
        other => Err(ValidationError::new(format!(
            "sharedWith must be a map or an array, found {}",
            json_type(other)
        ))),
    }
}

/// Validate and repair a plan document
///
/// Fails listing every missing required field (ownerUserId, ownerEmail,
/// name, sharedWith, createdAt). A legacy `userId` stands in for
/// `ownerUserId`. The owner's own email is removed from `sharedWith`.
pub fn normalize_plan(raw: &StoredDocument) -> Result<Plan, ValidationError> {
    let mut missing = Vec::new();

    let owner_user_id = non_empty_str(raw, plan_fields::OWNER_USER_ID)
        .or_else(|| non_empty_str(raw, plan_fields::LEGACY_USER_ID));
    if owner_user_id.is_none() {
        missing.push(plan_fields::OWNER_USER_ID);
    }
    let owner_email = raw.get_str(plan_fields::OWNER_EMAIL);
    if owner_email.is_none() {
        missing.push(plan_fields::OWNER_EMAIL);
    }
    let name = raw.get_str(plan_fields::NAME);
    if name.is_none() {
        missing.push(plan_fields::NAME);
    }
    let shared_with = present(raw, plan_fields::SHARED_WITH);
    if shared_with.is_none() {
        missing.push(plan_fields::SHARED_WITH);
    }
    let created_at = present(raw, plan_fields::CREATED_AT);
    if created_at.is_none() {
        missing.push(plan_fields::CREATED_AT);
    }

    match (owner_user_id, owner_email, name, shared_with, created_at) {
        (Some(owner_user_id), Some(owner_email), Some(name), Some(shared_with), Some(created_at)) => {
            let mut shared_with = coerce_shared_with(shared_with)?;
            shared_with.remove(owner_email);
            let created_at = parse_timestamp(created_at).ok_or_else(|| {
                ValidationError::new(format!("malformed createdAt on plan {}", raw.id))
            })?;

            Ok(Plan {
                id: raw.id.clone(),
                owner_user_id: owner_user_id.to_string(),
                owner_email: owner_email.to_string(),
                name: name.to_string(),
                shared_with,
                created_at,
            })
        }
        _ => Err(ValidationError::missing(
            "plan",
            missing.into_iter().map(String::from).collect(),
        )),
    }
}

/// Whether the stored document differs from the canonical form of `plan`
pub fn plan_needs_rewrite(raw: &StoredDocument, plan: &Plan) -> bool {
    plan.to_fields()
        .iter()
        .any(|(key, value)| raw.get(key) != Some(value))
}

/// Rebuild a plan that failed validation, keeping whatever is recoverable
///
/// Missing fields default from the owner; an unreadable `sharedWith`
/// becomes empty.
pub fn rebuild_plan(raw: &StoredDocument, owner: &User, now: DateTime<Utc>) -> Plan {
    let owner_email = raw
        .get_str(plan_fields::OWNER_EMAIL)
        .map(str::to_string)
        .unwrap_or_else(|| owner.email.clone());
    let mut shared_with = raw
        .get(plan_fields::SHARED_WITH)
        .and_then(|v| coerce_shared_with(v).ok())
        .unwrap_or_default();
    shared_with.remove(&owner_email);

    Plan {
        id: raw.id.clone(),
        owner_user_id: owner.id.clone(),
        name: raw
            .get_str(plan_fields::NAME)
            .map(str::to_string)
            .unwrap_or_else(|| owner.default_plan_name()),
        owner_email,
        shared_with,
        created_at: raw
            .get(plan_fields::CREATED_AT)
            .and_then(parse_timestamp)
            .unwrap_or_else(|| truncate_to_millis(now)),
    }
}

/// Validate a meal document
///
/// Required: userId, planId, date. Unknown or missing categories read as
/// `other`; missing lunch/dinner text reads as empty.
pub fn normalize_meal(raw: &StoredDocument) -> Result<Meal, ValidationError> {
    let mut missing = Vec::new();

    let user_id = non_empty_str(raw, meal_fields::USER_ID);
    if user_id.is_none() {
        missing.push(meal_fields::USER_ID);
    }
    let plan_id = non_empty_str(raw, meal_fields::PLAN_ID);
    if plan_id.is_none() {
        missing.push(meal_fields::PLAN_ID);
    }
    let date = non_empty_str(raw, meal_fields::DATE);
    if date.is_none() {
        missing.push(meal_fields::DATE);
    }

    let (Some(user_id), Some(plan_id), Some(date)) = (user_id, plan_id, date) else {
        return Err(ValidationError::missing(
            "meal",
            missing.into_iter().map(String::from).collect(),
        ));
    };

    let date = meal::parse_date(date).ok_or_else(|| {
        ValidationError::new(format!("malformed date {:?} on meal {}", date, raw.id))
    })?;

    Ok(Meal {
        id: raw.id.clone(),
        user_id: user_id.to_string(),
        plan_id: plan_id.to_string(),
        date,
        lunch: raw.get_str(meal_fields::LUNCH).unwrap_or_default().to_string(),
        lunch_category: MealCategory::from_raw(raw.get_str(meal_fields::LUNCH_CATEGORY)),
        dinner: raw.get_str(meal_fields::DINNER).unwrap_or_default().to_string(),
        dinner_category: MealCategory::from_raw(raw.get_str(meal_fields::DINNER_CATEGORY)),
        created_at: raw.get(meal_fields::CREATED_AT).and_then(parse_timestamp),
    })
}

/// Normalize every meal in a snapshot, skipping (and logging) invalid ones
pub fn normalize_meals(docs: &[StoredDocument]) -> Vec<Meal> {
    docs.iter()
        .filter_map(|doc| match normalize_meal(doc) {
            Ok(meal) => Some(meal),
            Err(e) => {
                tracing::warn!(meal_id = %doc.id, error = %e, "skipping invalid meal");
                None
            }
        })
        .collect()
}

/// Whether an email, as entered, names the owner of `plan`
pub fn is_owner_email(plan: &Plan, email: &str) -> bool {
    canonical_email(&plan.owner_email) == canonical_email(email)
}

/// RFC 3339 string or epoch milliseconds, at millisecond precision
fn parse_timestamp(value: &JsonValue) -> Option<DateTime<Utc>> {
    let parsed = match value {
        JsonValue::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        JsonValue::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }?;
    Some(truncate_to_millis(parsed))
}

fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

fn present<'a>(raw: &'a StoredDocument, field: &str) -> Option<&'a JsonValue> {
    raw.get(field).filter(|v| !v.is_null())
}

fn non_empty_str<'a>(raw: &'a StoredDocument, field: &str) -> Option<&'a str> {
    raw.get_str(field).filter(|s| !s.trim().is_empty())
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "a map",
    }
}
