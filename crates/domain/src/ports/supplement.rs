use crate::DomainResult;
use crate::ports::BoxFuture;

#[derive(Clone, Debug)]
pub struct SupplementQuery {
    pub category: Option<String>,
    /// Absolute offset into the source's item sequence; the implementation
    /// maps this onto its own paging.
    pub offset: usize,
    pub count: usize,
}

/// One externally sourced item, already validated and shaped.
#[derive(Clone, Debug, PartialEq)]
pub struct SupplementItem {
    pub id: String,
    pub title: String,
    pub body: Option<String>,
    pub source_name: String,
    pub external_url: Option<String>,
    pub image_url: Option<String>,
    pub published_at_ms: i64,
}

/// Best-effort external supplementary content source. May be slow or
/// unavailable; failures surface as `DomainError::TransientSource`.
pub trait SupplementSource: Send + Sync {
    fn fetch(
        &self,
        query: &SupplementQuery,
    ) -> BoxFuture<'_, DomainResult<Vec<SupplementItem>>>;
}
