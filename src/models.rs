//! Data models for campus accessibility reviews.
//!
//! This module contains the core data structures shared by the backend,
//! the aggregator and the submission pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of an institution row (seeded externally).
pub type InstitutionId = i64;

/// A reviewed sub-area of a campus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Recreation center / gym
    RecreationCenter,
    /// Dining hall
    DiningHall,
    /// Student center and main campus area
    MainArea,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Category; 3] = [
        Category::RecreationCenter,
        Category::DiningHall,
        Category::MainArea,
    ];

    /// Column name used by the hosted reviews table.
    pub fn column(&self) -> &'static str {
        match self {
            Category::RecreationCenter => "recreation_center_rating",
            Category::DiningHall => "dining_hall_rating",
            Category::MainArea => "main_area_rating",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Category::RecreationCenter => "Recreation Center",
            Category::DiningHall => "Dining Hall",
            Category::MainArea => "Student Center",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A single star rating, always within 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Build a rating, rejecting anything outside 1..=5.
    pub fn new(value: i64) -> Option<Self> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Some(Self(value as u8))
        } else {
            None
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Rating::new(value).ok_or_else(|| format!("rating {} is outside 1..=5", value))
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-category ratings of one review.
///
/// Historical rows may lack a category value; drafts validated by the
/// submission pipeline always carry all three.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRatings {
    pub recreation_center: Option<Rating>,
    pub dining_hall: Option<Rating>,
    pub main_area: Option<Rating>,
}

impl CategoryRatings {
    /// Ratings with every category filled in.
    #[allow(dead_code)] // Test fixtures build rows directly
    pub fn complete(recreation_center: Rating, dining_hall: Rating, main_area: Rating) -> Self {
        Self {
            recreation_center: Some(recreation_center),
            dining_hall: Some(dining_hall),
            main_area: Some(main_area),
        }
    }

    pub fn get(&self, category: Category) -> Option<Rating> {
        match category {
            Category::RecreationCenter => self.recreation_center,
            Category::DiningHall => self.dining_hall,
            Category::MainArea => self.main_area,
        }
    }

    pub fn set(&mut self, category: Category, rating: Rating) {
        let slot = match category {
            Category::RecreationCenter => &mut self.recreation_center,
            Category::DiningHall => &mut self.dining_hall,
            Category::MainArea => &mut self.main_area,
        };
        *slot = Some(rating);
    }

    /// The ratings that are present, in category order.
    pub fn present(&self) -> Vec<Rating> {
        Category::ALL.iter().filter_map(|c| self.get(*c)).collect()
    }

    pub fn is_complete(&self) -> bool {
        Category::ALL.iter().all(|c| self.get(*c).is_some())
    }
}

/// A university or campus being reviewed. Read-only for this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Institution {
    pub id: InstitutionId,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Cached overall rating maintained by the backend, if any.
    #[serde(default)]
    pub overall_rating: Option<f64>,
    /// Cached review count maintained by the backend, if any.
    #[serde(default)]
    pub total_reviews: Option<u32>,
}

/// A persisted review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub institution_id: InstitutionId,
    pub author_id: Uuid,
    /// Display name joined from the author's profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    pub comment: String,
    pub ratings: CategoryRatings,
    /// Stored overall score (mean of categories, one decimal).
    pub overall: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    /// Name to show next to the review.
    pub fn display_author(&self) -> &str {
        self.author_name.as_deref().unwrap_or("Anonymous")
    }
}

/// Payload of a review insert or in-place update.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub institution_id: InstitutionId,
    pub author_id: Uuid,
    pub overall: f64,
    pub ratings: CategoryRatings,
    pub comment: String,
}

/// Derived read-time averages for one institution.
///
/// `None` means "not available": no review carried a value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateRating {
    pub recreation_center: Option<f64>,
    pub dining_hall: Option<f64>,
    pub main_area: Option<f64>,
    pub overall: Option<f64>,
    pub review_count: usize,
}

impl AggregateRating {
    pub fn category(&self, category: Category) -> Option<f64> {
        match category {
            Category::RecreationCenter => self.recreation_center,
            Category::DiningHall => self.dining_hall,
            Category::MainArea => self.main_area,
        }
    }

    pub fn is_available(&self) -> bool {
        self.overall.is_some()
    }
}

/// Stable author identity handed out by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub identity: Identity,
}

impl Session {
    /// Whether the access token has passed its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expiry) if expiry <= now)
    }

    pub fn author_id(&self) -> Uuid {
        self.identity.id
    }
}
