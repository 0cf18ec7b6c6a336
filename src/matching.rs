//! Face-search backend seam.
//!
//! The current engine is a placeholder: it ignores the selfie and returns the
//! most recent uploads. A real biometric backend slots in behind the same
//! trait without touching callers.

use async_trait::async_trait;
use std::sync::Arc;

use crate::models::Photo;
use crate::repo::{Repo, RepoResult};

#[async_trait]
pub trait MatchEngine: Send + Sync {
    async fn find_matches(&self, selfie: &[u8], limit: usize) -> RepoResult<Vec<Photo>>;
}

/// Returns the newest photos regardless of the selfie contents.
pub struct ReturnRecent {
    repo: Arc<dyn Repo>,
}

impl ReturnRecent {
    pub fn new(repo: Arc<dyn Repo>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl MatchEngine for ReturnRecent {
    async fn find_matches(&self, _selfie: &[u8], limit: usize) -> RepoResult<Vec<Photo>> {
        self.repo.recent_photos(limit).await
    }
}
