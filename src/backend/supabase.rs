//! Hosted backend client.
//!
//! Talks to a Supabase-style service: PostgREST tables under `/rest/v1`,
//! RPC functions under `/rest/v1/rpc` and the auth service under `/auth/v1`.

use super::{IdentityProvider, ReviewBackend, SignUpOutcome};
use crate::error::BackendError;
use crate::models::{
    AggregateRating, Category, CategoryRatings, Identity, Institution, InstitutionId, NewReview,
    Rating, Review, Session,
};
use crate::ratings::{aggregate, round_to_tenth};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const REVIEW_SELECT: &str = "*,profiles(display_name)";

/// Connection settings for the hosted backend.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
    /// Client-side request timeout. `None` leaves timing to the service.
    pub timeout_seconds: Option<u64>,
    /// Ask the backend RPC for averages instead of computing them locally.
    pub server_side_averages: bool,
    pub averages_function: String,
}

impl From<&crate::config::BackendConfig> for SupabaseConfig {
    fn from(config: &crate::config::BackendConfig) -> Self {
        Self {
            url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            timeout_seconds: config.timeout_seconds,
            server_side_averages: config.server_side_averages,
            averages_function: config.averages_function.clone(),
        }
    }
}

/// REST client for the hosted backend.
pub struct SupabaseBackend {
    config: SupabaseConfig,
    http_client: reqwest::Client,
    base_url: String,
}

impl SupabaseBackend {
    pub fn new(config: SupabaseConfig) -> Result<Self, BackendError> {
        if config.anon_key.trim().is_empty() {
            return Err(BackendError::Config(
                "anon key is empty; set backend.anon_key or CAMPUSACCESS_ANON_KEY".to_string(),
            ));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http_client = builder
            .build()
            .map_err(|e| BackendError::Config(format!("failed to create HTTP client: {}", e)))?;

        let base_url = config.url.trim_end_matches('/').to_string();
        debug!("Backend base URL: {}", base_url);

        Ok(Self {
            config,
            http_client,
            base_url,
        })
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    /// Attach the project key and a bearer token (the anon key for public reads).
    fn authorized(&self, request: RequestBuilder, session: Option<&Session>) -> RequestBuilder {
        let token = session
            .map(|s| s.access_token.as_str())
            .unwrap_or(&self.config.anon_key);
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(self.config.timeout_seconds.unwrap_or_default())
            } else if e.is_connect() {
                BackendError::Connect(self.base_url.clone())
            } else {
                BackendError::Api {
                    status: 0,
                    body: format!("Failed to send request: {}", e),
                }
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!("Backend returned {}: {}", status, body);
        Err(status_error(status, body))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn select_reviews(&self, filters: &[(&str, String)]) -> Result<Vec<Review>, BackendError> {
        let mut query: Vec<(&str, String)> = vec![
            ("select", REVIEW_SELECT.to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        query.extend(filters.iter().cloned());

        let request = self
            .authorized(self.http_client.get(self.rest_url("reviews")), None)
            .query(&query);
        let rows: Vec<ReviewRow> = self.send_json(request).await?;
        Ok(rows.into_iter().map(ReviewRow::into_review).collect())
    }

    async fn fetch_remote_averages(&self, id: InstitutionId) -> Result<AggregateRating, BackendError> {
        let url = self.rest_url(&format!("rpc/{}", self.config.averages_function));
        let request = self
            .authorized(self.http_client.post(url), None)
            .json(&json!({ "university_id": id }));
        let value: Value = self.send_json(request).await?;
        parse_averages(value)
    }

    async fn write_review(
        &self,
        request: RequestBuilder,
        review: &NewReview,
        session: &Session,
    ) -> Result<Review, BackendError> {
        let request = self
            .authorized(request, Some(session))
            .header("Prefer", "return=representation")
            .query(&[("select", REVIEW_SELECT)])
            .json(&review_body(review));
        let rows: Vec<ReviewRow> = self.send_json(request).await?;
        rows.into_iter()
            .next()
            .map(ReviewRow::into_review)
            .ok_or_else(|| BackendError::NotFound("review write returned no rows".to_string()))
    }

    async fn upsert_profile(&self, session: &Session, display_name: &str) -> Result<(), BackendError> {
        let request = self
            .authorized(self.http_client.post(self.rest_url("profiles")), Some(session))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&json!({ "id": session.identity.id, "display_name": display_name }));
        self.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl ReviewBackend for SupabaseBackend {
    fn backend_tag(&self) -> &'static str {
        "supabase"
    }

    async fn search_institutions(&self, query: &str) -> Result<Vec<Institution>, BackendError> {
        debug!("Searching institutions for {:?}", query);
        let request = self
            .authorized(self.http_client.get(self.rest_url("universities")), None)
            .query(&[
                ("select", "*".to_string()),
                ("name", format!("ilike.*{}*", escape_like(query))),
                ("order", "name.asc".to_string()),
            ]);
        self.send_json(request).await
    }

    async fn list_institutions(&self) -> Result<Vec<Institution>, BackendError> {
        let request = self
            .authorized(self.http_client.get(self.rest_url("universities")), None)
            .query(&[("select", "*"), ("order", "name.asc")]);
        self.send_json(request).await
    }

    async fn get_institution(&self, id: InstitutionId) -> Result<Option<Institution>, BackendError> {
        let request = self
            .authorized(self.http_client.get(self.rest_url("universities")), None)
            .query(&[("select", "*".to_string()), ("id", format!("eq.{}", id))]);
        let rows: Vec<Institution> = self.send_json(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn find_institution_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Institution>, BackendError> {
        let request = self
            .authorized(self.http_client.get(self.rest_url("universities")), None)
            .query(&[
                ("select", "*".to_string()),
                ("name", format!("ilike.{}", escape_like(name.trim()))),
                ("limit", "1".to_string()),
            ]);
        let rows: Vec<Institution> = self.send_json(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_reviews(&self, id: InstitutionId) -> Result<Vec<Review>, BackendError> {
        let reviews = self
            .select_reviews(&[("university_id", format!("eq.{}", id))])
            .await?;
        debug!("Fetched {} reviews for institution {}", reviews.len(), id);
        Ok(reviews)
    }

    async fn fetch_averages(&self, id: InstitutionId) -> Result<AggregateRating, BackendError> {
        if self.config.server_side_averages {
            self.fetch_remote_averages(id).await
        } else {
            Ok(aggregate(&self.fetch_reviews(id).await?))
        }
    }

    async fn find_author_review(
        &self,
        id: InstitutionId,
        author: Uuid,
    ) -> Result<Option<Review>, BackendError> {
        let reviews = self
            .select_reviews(&[
                ("university_id", format!("eq.{}", id)),
                ("reviewer_id", format!("eq.{}", author)),
                ("limit", "1".to_string()),
            ])
            .await?;
        Ok(reviews.into_iter().next())
    }

    async fn insert_review(
        &self,
        review: &NewReview,
        session: &Session,
    ) -> Result<Review, BackendError> {
        info!("Inserting review for institution {}", review.institution_id);
        let request = self.http_client.post(self.rest_url("reviews"));
        self.write_review(request, review, session).await
    }

    async fn update_review(
        &self,
        review_id: Uuid,
        review: &NewReview,
        session: &Session,
    ) -> Result<Review, BackendError> {
        info!("Updating review {} in place", review_id);
        let request = self
            .http_client
            .patch(self.rest_url("reviews"))
            .query(&[("id", format!("eq.{}", review_id))]);
        self.write_review(request, review, session).await
    }
}

#[async_trait]
impl IdentityProvider for SupabaseBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<SignUpOutcome, BackendError> {
        let request = self
            .authorized(self.http_client.post(self.auth_url("signup")), None)
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "display_name": display_name },
            }));
        let value: Value = self.send_json(request).await?;

        if value.get("access_token").is_some() {
            let session = parse_session(value, Utc::now())?;
            if let Err(e) = self.upsert_profile(&session, display_name).await {
                warn!("Signed up but failed to store profile: {}", e);
            }
            Ok(SignUpOutcome::SignedIn(session))
        } else {
            let user = value.get("user").cloned().unwrap_or(value);
            let user: UserRow =
                serde_json::from_value(user).map_err(|e| BackendError::Decode(e.to_string()))?;
            Ok(SignUpOutcome::ConfirmationPending(user.into_identity()))
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let request = self
            .authorized(self.http_client.post(self.auth_url("token")), None)
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));
        let value: Value = self.send_json(request).await?;
        parse_session(value, Utc::now())
    }

    async fn refresh_session(&self, session: &Session) -> Result<Session, BackendError> {
        let refresh_token = session
            .refresh_token
            .as_deref()
            .ok_or(BackendError::Unauthorized)?;

        debug!("Refreshing session for {}", session.identity.id);
        let request = self
            .authorized(self.http_client.post(self.auth_url("token")), None)
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }));
        let value: Value = self.send_json(request).await?;
        parse_session(value, Utc::now())
    }

    async fn sign_out(&self, session: &Session) -> Result<(), BackendError> {
        let request = self.authorized(self.http_client.post(self.auth_url("logout")), Some(session));
        self.send(request).await?;
        Ok(())
    }

    async fn lookup_session(&self, session: &Session) -> Result<Option<Identity>, BackendError> {
        let request = self.authorized(self.http_client.get(self.auth_url("user")), Some(session));
        match self.send_json::<UserRow>(request).await {
            Ok(user) => Ok(Some(user.into_identity())),
            Err(BackendError::Unauthorized) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete_account(&self, session: &Session) -> Result<(), BackendError> {
        let user_id = session.identity.id;
        info!("Deleting account {}", user_id);

        let user = self
            .authorized(self.http_client.post(self.rest_url("rpc/delete_user")), Some(session))
            .json(&json!({}));
        self.send(user).await?;

        // The user is gone; a leftover profile row only affects display names
        let profile = self
            .authorized(self.http_client.delete(self.rest_url("profiles")), Some(session))
            .query(&[("id", format!("eq.{}", user_id))]);
        if let Err(e) = self.send(profile).await {
            warn!("Account {} deleted but its profile row remains: {}", user_id, e);
        }
        Ok(())
    }
}

/// Map a non-success status to an error.
///
/// Only 401 means the credentials are bad. A 403 is a row policy refusing
/// the request for a valid user and stays an API error.
fn status_error(status: StatusCode, body: String) -> BackendError {
    match status {
        StatusCode::UNAUTHORIZED => BackendError::Unauthorized,
        StatusCode::NOT_FOUND => BackendError::NotFound(body),
        _ => BackendError::Api {
            status: status.as_u16(),
            body,
        },
    }
}

/// Escape LIKE metacharacters so user input only matches literally.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' | '%' | '_' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            // PostgREST treats `*` as a wildcard
            '*' => {}
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Column layout of a review insert/update.
fn review_body(review: &NewReview) -> Value {
    let mut body = json!({
        "university_id": review.institution_id,
        "reviewer_id": review.author_id,
        "stars": review.overall,
        "comment": review.comment,
    });
    for category in Category::ALL {
        body[category.column()] = json!(review.ratings.get(category));
    }
    body
}

#[derive(Debug, Deserialize)]
struct ProfileRef {
    #[serde(default)]
    display_name: Option<String>,
}

/// A `reviews` row as the REST interface returns it.
#[derive(Debug, Deserialize)]
struct ReviewRow {
    id: Uuid,
    university_id: InstitutionId,
    reviewer_id: Uuid,
    #[serde(default)]
    stars: Option<f64>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    recreation_center_rating: Option<i64>,
    #[serde(default)]
    dining_hall_rating: Option<i64>,
    #[serde(default)]
    main_area_rating: Option<i64>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    profiles: Option<ProfileRef>,
}

impl ReviewRow {
    fn into_review(self) -> Review {
        let ratings = CategoryRatings {
            recreation_center: stored_rating(self.recreation_center_rating),
            dining_hall: stored_rating(self.dining_hall_rating),
            main_area: stored_rating(self.main_area_rating),
        };

        Review {
            id: self.id,
            institution_id: self.university_id,
            author_id: self.reviewer_id,
            author_name: self.profiles.and_then(|p| p.display_name),
            comment: self.comment.unwrap_or_default(),
            ratings,
            overall: self.stars.map(round_to_tenth),
            created_at: self.created_at,
        }
    }
}

/// Out-of-range stored values are treated as missing.
fn stored_rating(value: Option<i64>) -> Option<Rating> {
    let value = value?;
    let rating = Rating::new(value);
    if rating.is_none() {
        warn!("Ignoring stored rating {} outside 1..=5", value);
    }
    rating
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

impl UserRow {
    fn into_identity(self) -> Identity {
        Identity {
            id: self.id,
            email: self.email,
            display_name: self.user_metadata.and_then(|m| m.display_name),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserRow,
}

/// Build a session from an auth token response.
fn parse_session(value: Value, now: DateTime<Utc>) -> Result<Session, BackendError> {
    let token: TokenResponse =
        serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))?;

    let expires_at = match (token.expires_at, token.expires_in) {
        (Some(at), _) => Utc.timestamp_opt(at, 0).single(),
        (None, Some(secs)) => Some(now + ChronoDuration::seconds(secs)),
        (None, None) => None,
    };

    Ok(Session {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        expires_at,
        identity: token.user.into_identity(),
    })
}

#[derive(Debug, Deserialize)]
struct AveragesRow {
    #[serde(default)]
    recreation_center_avg: Option<f64>,
    #[serde(default)]
    dining_hall_avg: Option<f64>,
    #[serde(default)]
    main_area_avg: Option<f64>,
    #[serde(default)]
    overall_avg: Option<f64>,
    #[serde(default)]
    review_count: Option<usize>,
}

/// Decode the averages RPC result; set-returning functions wrap it in an array.
fn parse_averages(value: Value) -> Result<AggregateRating, BackendError> {
    let row = match value {
        Value::Array(rows) => match rows.into_iter().next() {
            Some(row) => row,
            None => return Ok(AggregateRating::default()),
        },
        other => other,
    };

    let row: AveragesRow =
        serde_json::from_value(row).map_err(|e| BackendError::Decode(e.to_string()))?;

    Ok(AggregateRating {
        recreation_center: row.recreation_center_avg.map(round_to_tenth),
        dining_hall: row.dining_hall_avg.map(round_to_tenth),
        main_area: row.main_area_avg.map(round_to_tenth),
        overall: row.overall_avg.map(round_to_tenth),
        review_count: row.review_count.unwrap_or_default(),
    })
}
