//! Meal domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::plan::format_timestamp;

/// Collection holding meal documents
pub const MEALS_COLLECTION: &str = "meals";

/// Document field names for meals
pub mod fields {
    pub const USER_ID: &str = "userId";
    pub const PLAN_ID: &str = "planId";
    pub const DATE: &str = "date";
    pub const LUNCH: &str = "lunch";
    pub const LUNCH_CATEGORY: &str = "lunchCategory";
    pub const DINNER: &str = "dinner";
    pub const DINNER_CATEGORY: &str = "dinnerCategory";
    pub const CREATED_AT: &str = "createdAt";
}

/// Date format used for meal documents
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// What a lunch or dinner is mostly made of
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealCategory {
    #[serde(alias = "vegetariano")]
    Vegetarian,
    #[serde(alias = "pesce")]
    Fish,
    #[serde(alias = "carne")]
    Meat,
    #[serde(alias = "legumi")]
    Legumes,
    #[serde(alias = "zuppa")]
    Soup,
    #[default]
    #[serde(alias = "altro")]
    Other,
}

impl MealCategory {
    pub const ALL: [MealCategory; 6] = [
        MealCategory::Vegetarian,
        MealCategory::Fish,
        MealCategory::Meat,
        MealCategory::Legumes,
        MealCategory::Soup,
        MealCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MealCategory::Vegetarian => "vegetarian",
            MealCategory::Fish => "fish",
            MealCategory::Meat => "meat",
            MealCategory::Legumes => "legumes",
            MealCategory::Soup => "soup",
            MealCategory::Other => "other",
        }
    }

    /// Lenient read: unknown or missing values become `Other`
    pub fn from_raw(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.parse().ok()).unwrap_or_default()
    }
}

impl FromStr for MealCategory {
    type Err = String;

    /// Accepts canonical names and the Italian names older records used
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vegetarian" | "vegetariano" => Ok(MealCategory::Vegetarian),
            "fish" | "pesce" => Ok(MealCategory::Fish),
            "meat" | "carne" => Ok(MealCategory::Meat),
            "legumes" | "legumi" => Ok(MealCategory::Legumes),
            "soup" | "zuppa" => Ok(MealCategory::Soup),
            "other" | "altro" => Ok(MealCategory::Other),
            other => Err(format!("unknown meal category: {}", other)),
        }
    }
}

impl fmt::Display for MealCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record of lunch and dinner for a date within a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub id: String,
    /// Creator
    pub user_id: String,
    pub plan_id: String,
    pub date: NaiveDate,
    pub lunch: String,
    pub lunch_category: MealCategory,
    pub dinner: String,
    pub dinner_category: MealCategory,
    /// Absent on records that predate timestamps
    pub created_at: Option<DateTime<Utc>>,
}

impl Meal {
    /// Document body (the id lives outside the body)
    pub fn to_fields(&self) -> Map<String, JsonValue> {
        let mut doc = Map::new();
        doc.insert(fields::USER_ID.into(), JsonValue::String(self.user_id.clone()));
        doc.insert(fields::PLAN_ID.into(), JsonValue::String(self.plan_id.clone()));
        doc.insert(fields::DATE.into(), JsonValue::String(format_date(&self.date)));
        doc.insert(fields::LUNCH.into(), JsonValue::String(self.lunch.clone()));
        doc.insert(
            fields::LUNCH_CATEGORY.into(),
            JsonValue::String(self.lunch_category.as_str().into()),
        );
        doc.insert(fields::DINNER.into(), JsonValue::String(self.dinner.clone()));
        doc.insert(
            fields::DINNER_CATEGORY.into(),
            JsonValue::String(self.dinner_category.as_str().into()),
        );
        if let Some(created_at) = &self.created_at {
            doc.insert(
                fields::CREATED_AT.into(),
                JsonValue::String(format_timestamp(created_at)),
            );
        }
        doc
    }
}

/// User input for a new meal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MealDraft {
    pub date: Option<NaiveDate>,
    pub lunch: String,
    pub lunch_category: MealCategory,
    pub dinner: String,
    pub dinner_category: MealCategory,
}

impl MealDraft {
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Self::default()
        }
    }

    pub fn lunch(mut self, text: impl Into<String>, category: MealCategory) -> Self {
        self.lunch = text.into();
        self.lunch_category = category;
        self
    }

    pub fn dinner(mut self, text: impl Into<String>, category: MealCategory) -> Self {
        self.dinner = text.into();
        self.dinner_category = category;
        self
    }
}

/// Partial edit of a meal. Date and plan are immutable after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MealUpdate {
    pub lunch: Option<String>,
    pub lunch_category: Option<MealCategory>,
    pub dinner: Option<String>,
    pub dinner_category: Option<MealCategory>,
}

impl MealUpdate {
    pub fn is_empty(&self) -> bool {
        self.lunch.is_none()
            && self.lunch_category.is_none()
            && self.dinner.is_none()
            && self.dinner_category.is_none()
    }

    /// Only the editable fields that are set
    pub fn to_fields(&self) -> Map<String, JsonValue> {
        let mut doc = Map::new();
        if let Some(lunch) = &self.lunch {
            doc.insert(fields::LUNCH.into(), JsonValue::String(lunch.clone()));
        }
        if let Some(category) = self.lunch_category {
            doc.insert(
                fields::LUNCH_CATEGORY.into(),
                JsonValue::String(category.as_str().into()),
            );
        }
        if let Some(dinner) = &self.dinner {
            doc.insert(fields::DINNER.into(), JsonValue::String(dinner.clone()));
        }
        if let Some(category) = self.dinner_category {
            doc.insert(
                fields::DINNER_CATEGORY.into(),
                JsonValue::String(category.as_str().into()),
            );
        }
        doc
    }
}

pub fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}
