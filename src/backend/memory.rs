//! In-memory backend used by tests.

use super::{IdentityProvider, ReviewBackend, SignUpOutcome};
use crate::error::BackendError;
use crate::models::{
    AggregateRating, Identity, Institution, InstitutionId, NewReview, Review, Session,
};
use crate::ratings::aggregate;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

struct Account {
    password: String,
    identity: Identity,
}

/// In-memory stand-in for the hosted backend.
#[derive(Default)]
pub struct InMemoryBackend {
    pub institutions: Mutex<Vec<Institution>>,
    pub reviews: Mutex<Vec<Review>>,
    accounts: Mutex<HashMap<String, Account>>,
    tokens: Mutex<HashMap<String, Uuid>>,
    refresh_tokens: Mutex<HashMap<String, Uuid>>,
    pub fail_writes: AtomicBool,
    /// Refuse writes the way a row policy does: 403 for a valid user.
    pub forbid_writes: AtomicBool,
    /// Fail review and average reads.
    pub fail_reads: AtomicBool,
    pub write_calls: AtomicU64,
    pub review_fetches: AtomicU64,
    pub average_fetches: AtomicU64,
    pub institution_fetches: AtomicU64,
}

impl InMemoryBackend {
    pub fn with_institutions(institutions: Vec<Institution>) -> Self {
        Self {
            institutions: Mutex::new(institutions),
            ..Self::default()
        }
    }

    pub fn writes(&self) -> u64 {
        self.write_calls.load(Ordering::Relaxed)
    }

    async fn session_user(&self, session: &Session) -> Result<Uuid, BackendError> {
        self.tokens
            .lock()
            .await
            .get(&session.access_token)
            .copied()
            .ok_or(BackendError::Unauthorized)
    }

    async fn display_name(&self, author: Uuid) -> Option<String> {
        self.accounts
            .lock()
            .await
            .values()
            .find(|a| a.identity.id == author)
            .and_then(|a| a.identity.display_name.clone())
    }

    fn begin_write(&self) -> Result<(), BackendError> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(BackendError::Connect("memory://offline".to_string()));
        }
        if self.forbid_writes.load(Ordering::Relaxed) {
            return Err(BackendError::Api {
                status: 403,
                body: "new row violates row-level security policy".to_string(),
            });
        }
        Ok(())
    }

    fn begin_read(&self) -> Result<(), BackendError> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(BackendError::Timeout(5));
        }
        Ok(())
    }

    async fn issue_session(&self, identity: Identity) -> Session {
        let token = Uuid::new_v4().to_string();
        let refresh = Uuid::new_v4().to_string();
        self.tokens.lock().await.insert(token.clone(), identity.id);
        self.refresh_tokens
            .lock()
            .await
            .insert(refresh.clone(), identity.id);
        Session {
            access_token: token,
            refresh_token: Some(refresh),
            expires_at: None,
            identity,
        }
    }

    /// Revoke an access token while keeping its refresh token usable.
    pub async fn expire_access_token(&self, session: &Session) {
        self.tokens.lock().await.remove(&session.access_token);
    }
}

#[async_trait]
impl ReviewBackend for InMemoryBackend {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn search_institutions(&self, query: &str) -> Result<Vec<Institution>, BackendError> {
        let needle = query.to_lowercase();
        Ok(self
            .institutions
            .lock()
            .await
            .iter()
            .filter(|i| i.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn list_institutions(&self) -> Result<Vec<Institution>, BackendError> {
        Ok(self.institutions.lock().await.clone())
    }

    async fn get_institution(&self, id: InstitutionId) -> Result<Option<Institution>, BackendError> {
        self.institution_fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .institutions
            .lock()
            .await
            .iter()
            .find(|i| i.id == id)
            .cloned())
    }

    async fn find_institution_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Institution>, BackendError> {
        self.institution_fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .institutions
            .lock()
            .await
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name.trim()))
            .cloned())
    }

    async fn fetch_reviews(&self, id: InstitutionId) -> Result<Vec<Review>, BackendError> {
        self.review_fetches.fetch_add(1, Ordering::Relaxed);
        self.begin_read()?;
        let mut reviews: Vec<Review> = self
            .reviews
            .lock()
            .await
            .iter()
            .filter(|r| r.institution_id == id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }

    async fn fetch_averages(&self, id: InstitutionId) -> Result<AggregateRating, BackendError> {
        self.average_fetches.fetch_add(1, Ordering::Relaxed);
        self.begin_read()?;
        let reviews = self.reviews.lock().await;
        let matching: Vec<Review> = reviews
            .iter()
            .filter(|r| r.institution_id == id)
            .cloned()
            .collect();
        Ok(aggregate(&matching))
    }

    async fn find_author_review(
        &self,
        id: InstitutionId,
        author: Uuid,
    ) -> Result<Option<Review>, BackendError> {
        Ok(self
            .reviews
            .lock()
            .await
            .iter()
            .find(|r| r.institution_id == id && r.author_id == author)
            .cloned())
    }

    async fn insert_review(
        &self,
        review: &NewReview,
        session: &Session,
    ) -> Result<Review, BackendError> {
        self.begin_write()?;
        if self.session_user(session).await? != review.author_id {
            return Err(BackendError::Unauthorized);
        }

        let stored = Review {
            id: Uuid::new_v4(),
            institution_id: review.institution_id,
            author_id: review.author_id,
            author_name: self.display_name(review.author_id).await,
            comment: review.comment.clone(),
            ratings: review.ratings,
            overall: Some(review.overall),
            created_at: Utc::now(),
        };
        self.reviews.lock().await.push(stored.clone());
        Ok(stored)
    }

    async fn update_review(
        &self,
        review_id: Uuid,
        review: &NewReview,
        session: &Session,
    ) -> Result<Review, BackendError> {
        self.begin_write()?;
        if self.session_user(session).await? != review.author_id {
            return Err(BackendError::Unauthorized);
        }

        let mut reviews = self.reviews.lock().await;
        let existing = reviews
            .iter_mut()
            .find(|r| r.id == review_id && r.author_id == review.author_id)
            .ok_or_else(|| BackendError::NotFound(format!("review {}", review_id)))?;

        existing.comment = review.comment.clone();
        existing.ratings = review.ratings;
        existing.overall = Some(review.overall);
        Ok(existing.clone())
    }
}

#[async_trait]
impl IdentityProvider for InMemoryBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<SignUpOutcome, BackendError> {
        let identity = Identity {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            display_name: Some(display_name.to_string()),
        };

        {
            let mut accounts = self.accounts.lock().await;
            if accounts.contains_key(email) {
                return Err(BackendError::Api {
                    status: 422,
                    body: "User already registered".to_string(),
                });
            }
            accounts.insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    identity: identity.clone(),
                },
            );
        }

        Ok(SignUpOutcome::SignedIn(self.issue_session(identity).await))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let identity = {
            let accounts = self.accounts.lock().await;
            match accounts.get(email) {
                Some(account) if account.password == password => account.identity.clone(),
                _ => return Err(BackendError::Unauthorized),
            }
        };
        Ok(self.issue_session(identity).await)
    }

    async fn refresh_session(&self, session: &Session) -> Result<Session, BackendError> {
        let refresh = session
            .refresh_token
            .as_deref()
            .ok_or(BackendError::Unauthorized)?;
        // Refresh tokens are single-use
        let user = self
            .refresh_tokens
            .lock()
            .await
            .remove(refresh)
            .ok_or(BackendError::Unauthorized)?;
        if user != session.identity.id {
            return Err(BackendError::Unauthorized);
        }
        Ok(self.issue_session(session.identity.clone()).await)
    }

    async fn sign_out(&self, session: &Session) -> Result<(), BackendError> {
        self.tokens.lock().await.remove(&session.access_token);
        if let Some(refresh) = &session.refresh_token {
            self.refresh_tokens.lock().await.remove(refresh);
        }
        Ok(())
    }

    async fn lookup_session(&self, session: &Session) -> Result<Option<Identity>, BackendError> {
        let Ok(user) = self.session_user(session).await else {
            return Ok(None);
        };
        Ok(self
            .accounts
            .lock()
            .await
            .values()
            .find(|a| a.identity.id == user)
            .map(|a| a.identity.clone()))
    }

    async fn delete_account(&self, session: &Session) -> Result<(), BackendError> {
        let user = self.session_user(session).await?;
        self.accounts.lock().await.retain(|_, a| a.identity.id != user);
        self.tokens.lock().await.retain(|_, id| *id != user);
        self.refresh_tokens.lock().await.retain(|_, id| *id != user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn signed_up(backend: &InMemoryBackend, email: &str) -> Session {
        match backend.sign_up(email, "secret", "Sam").await.unwrap() {
            SignUpOutcome::SignedIn(session) => session,
            other => panic!("unexpected sign-up outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sign_in_checks_password() {
        let backend = InMemoryBackend::default();
        let first = signed_up(&backend, "sam@smu.edu").await;

        let again = backend.sign_in("sam@smu.edu", "secret").await.unwrap();
        assert_eq!(again.identity.id, first.identity.id);
        assert!(matches!(
            backend.sign_in("sam@smu.edu", "wrong").await,
            Err(BackendError::Unauthorized)
        ));
        assert!(matches!(
            backend.sign_up("sam@smu.edu", "x", "Other").await,
            Err(BackendError::Api { status: 422, .. })
        ));
    }

    #[tokio::test]
    async fn test_lookup_after_sign_out_and_delete() {
        let backend = InMemoryBackend::default();
        let session = signed_up(&backend, "ana@tamu.edu").await;
        let identity = backend.lookup_session(&session).await.unwrap().unwrap();
        assert_eq!(identity.display_name.as_deref(), Some("Sam"));

        backend.sign_out(&session).await.unwrap();
        assert!(backend.lookup_session(&session).await.unwrap().is_none());

        let session = backend.sign_in("ana@tamu.edu", "secret").await.unwrap();
        backend.delete_account(&session).await.unwrap();
        assert!(backend.lookup_session(&session).await.unwrap().is_none());
        assert!(matches!(
            backend.sign_in("ana@tamu.edu", "secret").await,
            Err(BackendError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_refresh_tokens_are_single_use() {
        let backend = InMemoryBackend::default();
        let session = signed_up(&backend, "kim@txst.edu").await;

        let fresh = backend.refresh_session(&session).await.unwrap();
        assert_ne!(fresh.access_token, session.access_token);
        assert_eq!(fresh.identity.id, session.identity.id);
        assert!(matches!(
            backend.refresh_session(&session).await,
            Err(BackendError::Unauthorized)
        ));
    }
}
