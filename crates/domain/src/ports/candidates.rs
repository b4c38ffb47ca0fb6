use crate::DomainResult;
use crate::ports::BoxFuture;

/// Internal post surfaced by the persistent content store collaborator.
#[derive(Clone, Debug, PartialEq)]
pub struct CandidatePost {
    pub post_id: String,
    pub author_id: String,
    pub author_username: String,
    pub title: String,
    pub body: Option<String>,
    pub created_at_ms: i64,
}

/// Static post-to-topic classification, owned externally and read by the
/// affinity aggregator and the composer's ranking join.
#[derive(Clone, Debug, PartialEq)]
pub struct PostTopic {
    pub post_id: String,
    pub topic_id: String,
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostAuthor {
    pub post_id: String,
    pub author_id: String,
}

/// Static topic reference data; never mutated by this core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CandidateQuery {
    /// Most-recent-first fetch bound; ranking happens in the composer.
    pub limit: usize,
}

/// Read-only view of the persistent content store collaborator. The feed
/// composer never mutates it.
pub trait ContentStore: Send + Sync {
    fn recent_candidates(
        &self,
        query: &CandidateQuery,
    ) -> BoxFuture<'_, DomainResult<Vec<CandidatePost>>>;

    fn topics_for_posts(
        &self,
        post_ids: &[String],
    ) -> BoxFuture<'_, DomainResult<Vec<PostTopic>>>;

    fn authors_for_posts(
        &self,
        post_ids: &[String],
    ) -> BoxFuture<'_, DomainResult<Vec<PostAuthor>>>;

    fn topic_details(&self, topic_ids: &[String]) -> BoxFuture<'_, DomainResult<Vec<Topic>>>;
}
