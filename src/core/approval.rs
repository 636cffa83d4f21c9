use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::core::pipeline::{PublicationReport, Publisher, publish_all};
use crate::core::refine::{RefineError, RefinementEngine};
use crate::store::Storage;
use crate::store::types::Weekday;

/// In-memory generation result moving through review. `target: None`
/// means "publish immediately on approval".
#[derive(Debug, Clone)]
pub struct Draft {
    pub text: String,
    pub media: Vec<String>,
    pub target: Option<Weekday>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    Drafted,
    PendingReview,
    PendingEdit,
    ApprovedScheduled,
    ApprovedImmediate,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    PublishedNow(PublicationReport),
    Scheduled(Weekday),
}

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("operation not valid in review state {0:?}")]
    InvalidState(ReviewState),
    #[error(transparent)]
    Refine(#[from] RefineError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Carries one draft from generation to a terminal state. Edit failures
/// leave the draft text exactly as it was and return the flow to
/// `PendingReview`; only the operator's explicit decisions move it out.
pub struct ApprovalFlow {
    draft: Draft,
    state: ReviewState,
    refiner: Arc<RefinementEngine>,
    storage: Arc<Storage>,
    publishers: Arc<Vec<Arc<dyn Publisher>>>,
}

impl ApprovalFlow {
    pub fn new(
        draft: Draft,
        refiner: Arc<RefinementEngine>,
        storage: Arc<Storage>,
        publishers: Arc<Vec<Arc<dyn Publisher>>>,
    ) -> Self {
        Self {
            draft,
            state: ReviewState::Drafted,
            refiner,
            storage,
            publishers,
        }
    }

    pub fn state(&self) -> ReviewState {
        self.state
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    /// Surface the draft to the operator. Text and media are attached at
    /// construction, so this transition always succeeds from `Drafted`.
    pub fn submit(&mut self) -> Result<(), ApprovalError> {
        match self.state {
            ReviewState::Drafted => {
                self.state = ReviewState::PendingReview;
                Ok(())
            }
            other => Err(ApprovalError::InvalidState(other)),
        }
    }

    /// Approve the draft. With a weekday it is parked in the
    /// scheduled-post store; without one it is published immediately.
    pub async fn approve(
        &mut self,
        weekday: Option<Weekday>,
        author: &str,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        if self.state != ReviewState::PendingReview {
            return Err(ApprovalError::InvalidState(self.state));
        }

        match weekday.or(self.draft.target) {
            Some(day) => {
                self.storage
                    .put_scheduled_post(day, &self.draft.text, &self.draft.media, author)
                    .await?;
                self.state = ReviewState::ApprovedScheduled;
                info!(weekday = day.as_str(), "draft approved and scheduled");
                Ok(ApprovalOutcome::Scheduled(day))
            }
            None => {
                let report =
                    publish_all(&self.publishers, &self.draft.text, &self.draft.media).await;
                self.state = ReviewState::ApprovedImmediate;
                info!(
                    succeeded = report.succeeded().len(),
                    failed = report.failed().len(),
                    "draft approved and published immediately"
                );
                Ok(ApprovalOutcome::PublishedNow(report))
            }
        }
    }

    /// Approve and publish right now regardless of the draft's target
    /// weekday.
    pub async fn approve_immediate(&mut self) -> Result<ApprovalOutcome, ApprovalError> {
        if self.state != ReviewState::PendingReview {
            return Err(ApprovalError::InvalidState(self.state));
        }
        let report = publish_all(&self.publishers, &self.draft.text, &self.draft.media).await;
        self.state = ReviewState::ApprovedImmediate;
        Ok(ApprovalOutcome::PublishedNow(report))
    }

    /// Apply an edit instruction through the refinement engine. On any
    /// failure the prior text is untouched and the error is surfaced.
    pub async fn edit(&mut self, instruction: &str) -> Result<(), ApprovalError> {
        if self.state != ReviewState::PendingReview {
            return Err(ApprovalError::InvalidState(self.state));
        }
        self.state = ReviewState::PendingEdit;

        let result = self.refiner.refine(&self.draft.text, instruction).await;
        self.state = ReviewState::PendingReview;
        match result {
            Ok(new_text) => {
                self.draft.text = new_text;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Discard the draft. No side effects.
    pub fn cancel(&mut self) -> Result<(), ApprovalError> {
        match self.state {
            ReviewState::Drafted | ReviewState::PendingReview => {
                self.state = ReviewState::Cancelled;
                Ok(())
            }
            other => Err(ApprovalError::InvalidState(other)),
        }
    }
}
