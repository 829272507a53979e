use std::sync::Arc;

use crate::repository::Repository;

#[derive(Debug, Clone)]
#[must_use]
pub struct SharedState {
    pub repository: Repository,
    /// The other party of the conversation shown on the front page.
    pub peer: Arc<str>,
}
