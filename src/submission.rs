//! Review submission pipeline.
//!
//! `Idle → Validating → Submitting → Success | Failed`. Validation and the
//! identity check happen before any backend call; a successful write ends
//! with a targeted refresh of the school page.

use crate::backend::ReviewBackend;
use crate::error::{SubmissionError, ValidationError};
use crate::models::{Category, CategoryRatings, NewReview, Rating, Review, Session};
use crate::views::{Invalidation, PageLoader, SchoolPage};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Raw form input. The pipeline only borrows it, so the caller keeps the
/// entered data when a submission fails.
#[derive(Debug, Clone, Default)]
pub struct ReviewDraft {
    pub comment: String,
    pub ratings: BTreeMap<Category, i64>,
}

impl ReviewDraft {
    pub fn new(comment: impl Into<String>) -> Self {
        Self {
            comment: comment.into(),
            ratings: BTreeMap::new(),
        }
    }

    pub fn rate(mut self, category: Category, value: i64) -> Self {
        self.ratings.insert(category, value);
        self
    }

    /// Check the draft and produce validated ratings and the trimmed comment.
    pub fn validate(&self) -> Result<(CategoryRatings, String), ValidationError> {
        let comment = self.comment.trim();
        if comment.is_empty() {
            return Err(ValidationError::EmptyComment);
        }

        let mut ratings = CategoryRatings::default();
        for category in Category::ALL {
            let value = *self
                .ratings
                .get(&category)
                .ok_or(ValidationError::MissingRating(category))?;
            let rating = Rating::new(value)
                .ok_or(ValidationError::RatingOutOfRange { category, value })?;
            ratings.set(category, rating);
        }
        debug_assert!(ratings.is_complete());

        Ok((ratings, comment.to_string()))
    }
}

/// Whether a submission created a review or replaced the author's earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Created,
    Updated,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Created => write!(f, "created"),
            Disposition::Updated => write!(f, "updated"),
        }
    }
}

/// A review that made it to the backend.
#[derive(Debug, Clone)]
pub struct Submitted {
    pub review: Review,
    pub disposition: Disposition,
    pub invalidation: Invalidation,
}

/// Pipeline state.
#[derive(Debug)]
pub enum SubmissionState {
    Idle,
    Validating,
    Submitting,
    Success(Submitted),
    Failed(SubmissionError),
}

impl SubmissionState {
    pub fn name(&self) -> &'static str {
        match self {
            SubmissionState::Idle => "idle",
            SubmissionState::Validating => "validating",
            SubmissionState::Submitting => "submitting",
            SubmissionState::Success(_) => "success",
            SubmissionState::Failed(_) => "failed",
        }
    }

    /// The stored review once the pipeline reached `Success`.
    #[allow(dead_code)] // The CLI reads the submit result directly
    pub fn submitted(&self) -> Option<&Submitted> {
        match self {
            SubmissionState::Success(submitted) => Some(submitted),
            _ => None,
        }
    }

    /// Why the last submission failed.
    #[allow(dead_code)] // The CLI reads the submit result directly
    pub fn error(&self) -> Option<&SubmissionError> {
        match self {
            SubmissionState::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Drives one review form through validation, persistence and refresh.
pub struct ReviewPipeline {
    backend: Arc<dyn ReviewBackend>,
    loader: PageLoader,
    state: SubmissionState,
}

impl ReviewPipeline {
    pub fn new(backend: Arc<dyn ReviewBackend>) -> Self {
        Self {
            loader: PageLoader::new(backend.clone()),
            backend,
            state: SubmissionState::Idle,
        }
    }

    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    /// Back to `Idle`, e.g. after the user dismisses the result.
    #[allow(dead_code)] // One submission per CLI run
    pub fn reset(&mut self) {
        self.transition(SubmissionState::Idle);
    }

    fn transition(&mut self, next: SubmissionState) {
        debug!("Submission {} -> {}", self.state.name(), next.name());
        self.state = next;
    }

    fn fail(&mut self, error: SubmissionError) -> SubmissionError {
        warn!("Review submission failed: {}", error);
        self.transition(SubmissionState::Failed(error.clone()));
        error
    }

    /// Submit a draft for the school shown on `page`.
    ///
    /// On success the page's review list and averages are refreshed in
    /// place. A refresh failure after a successful write leaves the page
    /// stale but does not undo `Success`.
    pub async fn submit(
        &mut self,
        draft: &ReviewDraft,
        session: Option<&Session>,
        page: &mut SchoolPage,
    ) -> Result<Submitted, SubmissionError> {
        self.transition(SubmissionState::Validating);
        let (ratings, comment) = match draft.validate() {
            Ok(valid) => valid,
            Err(e) => return Err(self.fail(e.into())),
        };

        let Some(session) = session else {
            return Err(self.fail(SubmissionError::AuthenticationRequired));
        };

        self.transition(SubmissionState::Submitting);
        let institution_id = page.institution.id;
        let review = NewReview {
            institution_id,
            author_id: session.author_id(),
            overall: ratings.overall().unwrap_or_default(),
            ratings,
            comment,
        };

        let submitted = match self.persist(&review, session).await {
            Ok(submitted) => submitted,
            Err(e) => return Err(self.fail(e)),
        };

        info!(
            "Review {} {} for {} (overall {:.1})",
            submitted.review.id, submitted.disposition, page.institution.name, review.overall
        );

        if let Err(e) = self.loader.refresh(page, &submitted.invalidation).await {
            warn!("Review saved but refreshing the page failed: {}", e);
        }

        self.transition(SubmissionState::Success(submitted.clone()));
        Ok(submitted)
    }

    /// One review per author per institution: resubmitting updates in place.
    async fn persist(
        &self,
        review: &NewReview,
        session: &Session,
    ) -> Result<Submitted, SubmissionError> {
        let existing = self
            .backend
            .find_author_review(review.institution_id, review.author_id)
            .await?;

        let (stored, disposition) = match existing {
            Some(previous) => (
                self.backend.update_review(previous.id, review, session).await?,
                Disposition::Updated,
            ),
            None => (
                self.backend.insert_review(review, session).await?,
                Disposition::Created,
            ),
        };

        Ok(Submitted {
            invalidation: Invalidation::after_review_write(review.institution_id),
            review: stored,
            disposition,
        })
    }
}
