//! Access to the hosted backend.
//!
//! Data access and identity are two trait seams so the pipeline and views
//! can run against the hosted service or an in-memory store.

#[cfg(test)]
pub mod memory;
pub mod supabase;

use crate::error::BackendError;
use crate::models::{AggregateRating, Identity, Institution, InstitutionId, NewReview, Review, Session};
use async_trait::async_trait;
use uuid::Uuid;

pub use supabase::{SupabaseBackend, SupabaseConfig};

/// Institution and review storage.
#[async_trait]
pub trait ReviewBackend: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    /// Case-insensitive substring match on institution name.
    async fn search_institutions(&self, query: &str) -> Result<Vec<Institution>, BackendError>;

    async fn list_institutions(&self) -> Result<Vec<Institution>, BackendError>;

    async fn get_institution(&self, id: InstitutionId) -> Result<Option<Institution>, BackendError>;

    /// Exact, case-insensitive name match.
    async fn find_institution_by_name(&self, name: &str)
        -> Result<Option<Institution>, BackendError>;

    /// All reviews for an institution, newest first, with author names joined.
    async fn fetch_reviews(&self, id: InstitutionId) -> Result<Vec<Review>, BackendError>;

    /// Per-category and overall averages for an institution.
    async fn fetch_averages(&self, id: InstitutionId) -> Result<AggregateRating, BackendError>;

    /// The review this author already wrote for the institution, if any.
    async fn find_author_review(
        &self,
        id: InstitutionId,
        author: Uuid,
    ) -> Result<Option<Review>, BackendError>;

    async fn insert_review(
        &self,
        review: &NewReview,
        session: &Session,
    ) -> Result<Review, BackendError>;

    async fn update_review(
        &self,
        review_id: Uuid,
        review: &NewReview,
        session: &Session,
    ) -> Result<Review, BackendError>;
}

/// Result of a sign-up request.
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    /// The provider signed the user in immediately.
    SignedIn(Session),
    /// The account exists but the email must be confirmed first.
    ConfirmationPending(Identity),
}

/// External identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<SignUpOutcome, BackendError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    /// Trade the session's refresh token for a new session.
    /// `Unauthorized` when there is no usable refresh token.
    async fn refresh_session(&self, session: &Session) -> Result<Session, BackendError>;

    async fn sign_out(&self, session: &Session) -> Result<(), BackendError>;

    /// Resolve the identity behind a session; `None` if the provider rejects it.
    async fn lookup_session(&self, session: &Session) -> Result<Option<Identity>, BackendError>;

    async fn delete_account(&self, session: &Session) -> Result<(), BackendError>;
}
