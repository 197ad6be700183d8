//! Personal contacts
//!
//! A contact belongs to exactly one user. Input is validated through
//! [`ContactDraft`] before it reaches a store.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Days ahead covered by the upcoming birthdays view
pub const UPCOMING_BIRTHDAY_DAYS: i64 = 7;

/// Default page size for contact listings
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Hard cap on the page size
pub const MAX_PAGE_SIZE: i64 = 100;

/// Stored contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Contact {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub owner_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub birthday: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Create a contact owned by `owner_id` from validated input
    pub fn from_draft(owner_id: Uuid, draft: ContactDraft) -> Self {
        let now = Utc::now();
        let mut contact = Self {
            id: Uuid::new_v4(),
            owner_id,
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            phone: String::new(),
            birthday: draft.birthday,
            additional_info: None,
            created_at: now,
            updated_at: now,
        };
        contact.apply(draft);
        contact.updated_at = now;
        contact
    }

    /// Overwrite every editable field with `draft`
    pub fn apply(&mut self, draft: ContactDraft) {
        self.first_name = draft.first_name;
        self.last_name = draft.last_name;
        self.email = crate::normalize_email(&draft.email);
        self.phone = draft.phone;
        self.birthday = draft.birthday;
        self.additional_info = draft.additional_info;
        self.updated_at = Utc::now();
    }

    /// Next birthday on or after `today`; upcoming lists are ordered by it
    pub fn next_birthday(&self, today: NaiveDate) -> NaiveDate {
        next_anniversary(self.birthday, today)
    }

    /// Whether the next birthday falls within `days` days of `today` (inclusive)
    pub fn birthday_within(&self, today: NaiveDate, days: i64) -> bool {
        (self.next_birthday(today) - today).num_days() <= days
    }

    /// Case-insensitive filter used by the in-memory store
    pub fn matches(&self, filter: &ContactFilter) -> bool {
        if let Some(name) = filter.name.as_deref().filter(|n| !n.is_empty()) {
            let needle = name.to_lowercase();
            if !self.first_name.to_lowercase().contains(&needle)
                && !self.last_name.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if let Some(email) = filter.email.as_deref().filter(|e| !e.is_empty()) {
            if !self.email.contains(&email.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Contact input for create and update
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ContactDraft {
    #[validate(
        length(min = 1, max = 50),
        custom(function = "validate_name")
    )]
    pub first_name: String,
    #[validate(
        length(min = 1, max = 50),
        custom(function = "validate_name")
    )]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
    #[validate(custom(function = "validate_birthday"))]
    pub birthday: NaiveDate,
    #[validate(length(max = 500))]
    pub additional_info: Option<String>,
}

/// Listing filters and pagination
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams, ToSchema)]
pub struct ContactFilter {
    /// Records to skip
    #[serde(default)]
    pub skip: Option<i64>,
    /// Page size (default 10, max 100)
    #[serde(default)]
    pub limit: Option<i64>,
    /// Substring of first or last name
    #[serde(default)]
    pub name: Option<String>,
    /// Substring of the email address
    #[serde(default)]
    pub email: Option<String>,
}

impl ContactFilter {
    pub fn offset(&self) -> i64 {
        self.skip.unwrap_or(0).max(0)
    }

    pub fn page_size(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

fn validate_name(value: &str) -> Result<(), ValidationError> {
    if value.chars().all(char::is_alphabetic) {
        Ok(())
    } else {
        Err(ValidationError::new("name_not_alphabetic"))
    }
}

fn validate_phone(value: &str) -> Result<(), ValidationError> {
    if value.chars().all(|c| c.is_ascii_digit()) && matches!(value.len(), 10 | 11) {
        Ok(())
    } else {
        Err(ValidationError::new("phone_must_have_10_or_11_digits"))
    }
}

fn validate_birthday(value: &NaiveDate) -> Result<(), ValidationError> {
    if *value < Utc::now().date_naive() {
        Ok(())
    } else {
        Err(ValidationError::new("birthday_must_be_in_the_past"))
    }
}

/// First anniversary of `birthday` on or after `today`.
/// Feb 29 birthdays fall on Feb 28 in common years.
fn next_anniversary(birthday: NaiveDate, today: NaiveDate) -> NaiveDate {
    let this_year = anniversary_in(birthday, today.year());
    if this_year >= today {
        this_year
    } else {
        anniversary_in(birthday, today.year() + 1)
    }
}

fn anniversary_in(birthday: NaiveDate, year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, birthday.month(), birthday.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, birthday.month(), birthday.day() - 1))
        .unwrap_or(birthday)
}
