//! View models and the queries that fill them.
//!
//! After a write, only the queries named by an [`Invalidation`] are
//! re-run; the institution row itself is never re-fetched.

use crate::backend::ReviewBackend;
use crate::error::BackendError;
use crate::models::{AggregateRating, Institution, InstitutionId, Review};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of an institution search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub institutions: Vec<Institution>,
    /// True when nothing matched; shown as "no results", not an error.
    pub no_results: bool,
}

/// Everything shown on one school's page.
#[derive(Debug, Clone, Serialize)]
pub struct SchoolPage {
    pub institution: Institution,
    pub aggregate: AggregateRating,
    pub reviews: Vec<Review>,
}

/// How the user named a school.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstitutionRef {
    Id(InstitutionId),
    Name(String),
}

impl InstitutionRef {
    /// Numeric input is an id, anything else a name.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        match trimmed.parse::<InstitutionId>() {
            Ok(id) => InstitutionRef::Id(id),
            Err(_) => InstitutionRef::Name(trimmed.to_string()),
        }
    }
}

impl fmt::Display for InstitutionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstitutionRef::Id(id) => write!(f, "#{}", id),
            InstitutionRef::Name(name) => write!(f, "{:?}", name),
        }
    }
}

/// A query whose result a write made stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleQuery {
    Reviews,
    Aggregate,
}

/// The queries to re-run after a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub institution_id: InstitutionId,
    pub queries: Vec<StaleQuery>,
}

impl Invalidation {
    /// A new or updated review changes both the list and the averages.
    pub fn after_review_write(institution_id: InstitutionId) -> Self {
        Self {
            institution_id,
            queries: vec![StaleQuery::Reviews, StaleQuery::Aggregate],
        }
    }

    pub fn covers(&self, query: StaleQuery) -> bool {
        self.queries.contains(&query)
    }
}

/// Runs the read queries behind the views.
#[derive(Clone)]
pub struct PageLoader {
    backend: Arc<dyn ReviewBackend>,
}

impl PageLoader {
    pub fn new(backend: Arc<dyn ReviewBackend>) -> Self {
        Self { backend }
    }

    /// Search by name substring. A blank query matches nothing without a backend call.
    pub async fn search(&self, query: &str) -> Result<SearchResults, BackendError> {
        let trimmed = query.trim();
        let institutions = if trimmed.is_empty() {
            Vec::new()
        } else {
            self.backend.search_institutions(trimmed).await?
        };

        debug!("Search {:?} matched {} institutions", trimmed, institutions.len());
        Ok(SearchResults {
            query: trimmed.to_string(),
            no_results: institutions.is_empty(),
            institutions,
        })
    }

    pub async fn list_institutions(&self) -> Result<Vec<Institution>, BackendError> {
        self.backend.list_institutions().await
    }

    pub async fn resolve(&self, reference: &InstitutionRef) -> Result<Institution, BackendError> {
        let found = match reference {
            InstitutionRef::Id(id) => self.backend.get_institution(*id).await?,
            InstitutionRef::Name(name) => self.backend.find_institution_by_name(name).await?,
        };
        found.ok_or_else(|| BackendError::NotFound(format!("institution {}", reference)))
    }

    /// Load a school page; reviews and averages are fetched concurrently.
    pub async fn load_school(&self, reference: &InstitutionRef) -> Result<SchoolPage, BackendError> {
        let institution = self.resolve(reference).await?;
        let (reviews, aggregate) = futures::try_join!(
            self.backend.fetch_reviews(institution.id),
            self.backend.fetch_averages(institution.id)
        )?;

        info!(
            "Loaded {} with {} reviews",
            institution.name,
            reviews.len()
        );
        Ok(SchoolPage {
            institution,
            aggregate,
            reviews,
        })
    }

    /// Re-run only the invalidated queries for the page.
    pub async fn refresh(
        &self,
        page: &mut SchoolPage,
        invalidation: &Invalidation,
    ) -> Result<(), BackendError> {
        if invalidation.institution_id != page.institution.id {
            debug!(
                "Invalidation for {} does not touch page {}",
                invalidation.institution_id, page.institution.id
            );
            return Ok(());
        }

        let id = page.institution.id;
        let reviews = async {
            if invalidation.covers(StaleQuery::Reviews) {
                self.backend.fetch_reviews(id).await.map(Some)
            } else {
                Ok(None)
            }
        };
        let aggregate = async {
            if invalidation.covers(StaleQuery::Aggregate) {
                self.backend.fetch_averages(id).await.map(Some)
            } else {
                Ok(None)
            }
        };

        let (reviews, aggregate) = futures::try_join!(reviews, aggregate)?;
        if let Some(reviews) = reviews {
            page.reviews = reviews;
        }
        if let Some(aggregate) = aggregate {
            page.aggregate = aggregate;
        }

        debug!("Refreshed page for institution {}", id);
        Ok(())
    }
}
