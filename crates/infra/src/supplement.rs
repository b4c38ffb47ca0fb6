use std::sync::Arc;
use std::time::Duration;

use nagarik_domain::DomainResult;
use nagarik_domain::error::DomainError;
use nagarik_domain::ports::BoxFuture;
use nagarik_domain::ports::supplement::{SupplementItem, SupplementQuery, SupplementSource};
use nagarik_domain::util::{now_ms, stable_external_id};
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::RwLock;

use crate::config::AppConfig;

const REMOVED_MARKER: &str = "[Removed]";

/// Client for the external headline source. Best-effort: a bounded
/// timeout, and every transport or payload problem maps to
/// `TransientSource` so the composer can degrade instead of failing the
/// request.
#[derive(Clone)]
pub struct NewsSupplementClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    country: String,
    page_size: usize,
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    status: String,
    #[serde(default)]
    articles: Vec<NewsArticle>,
}

#[derive(Debug, Deserialize)]
pub struct NewsArticle {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "urlToImage")]
    pub url_to_image: Option<String>,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<String>,
    #[serde(default)]
    pub source: NewsArticleSource,
}

#[derive(Debug, Default, Deserialize)]
pub struct NewsArticleSource {
    pub name: Option<String>,
}

impl NewsSupplementClient {
    pub fn from_config(config: &AppConfig) -> DomainResult<Self> {
        let timeout = Duration::from_millis(config.supplement_timeout_ms.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| DomainError::TransientSource(err.to_string()))?;
        Ok(Self {
            http,
            base_url: config.supplement_base_url.trim_end_matches('/').to_string(),
            api_key: config.supplement_api_key.clone(),
            country: config.supplement_country.clone(),
            page_size: config.supplement_page_size.max(1),
        })
    }

    async fn fetch_page(
        &self,
        category: Option<&str>,
        page: usize,
    ) -> DomainResult<Vec<SupplementItem>> {
        let url = format!("{}/top-headlines", self.base_url);
        let page_size = self.page_size.to_string();
        let page_number = page.to_string();
        let mut params = vec![
            ("country", self.country.as_str()),
            ("apiKey", self.api_key.as_str()),
            ("pageSize", page_size.as_str()),
            ("page", page_number.as_str()),
        ];
        if let Some(category) = category {
            params.push(("category", category));
        }

        let response = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|err| DomainError::TransientSource(err.to_string()))?;
        if !response.status().is_success() {
            return Err(DomainError::TransientSource(format!(
                "headline source returned {}",
                response.status()
            )));
        }
        let body: NewsResponse = response
            .json()
            .await
            .map_err(|err| DomainError::TransientSource(err.to_string()))?;
        if body.status != "ok" {
            return Err(DomainError::TransientSource(format!(
                "headline source status '{}'",
                body.status
            )));
        }

        Ok(body
            .articles
            .into_iter()
            .filter(is_valid_article)
            .map(shape_article)
            .collect())
    }
}

impl SupplementSource for NewsSupplementClient {
    fn fetch(&self, query: &SupplementQuery) -> BoxFuture<'_, DomainResult<Vec<SupplementItem>>> {
        let query = query.clone();
        Box::pin(async move {
            if self.api_key.is_empty() {
                tracing::debug!("headline source api key not configured; returning no items");
                return Ok(Vec::new());
            }
            if query.count == 0 {
                return Ok(Vec::new());
            }

            // The caller's absolute offset maps onto the source's own
            // paging; a request window may straddle a page boundary.
            let mut items = Vec::with_capacity(query.count);
            let mut skip = query.offset % self.page_size;
            let mut page = query.offset / self.page_size + 1;
            loop {
                let fetched = self.fetch_page(query.category.as_deref(), page).await?;
                let exhausted = fetched.len() < self.page_size;
                items.extend(fetched.into_iter().skip(skip));
                if items.len() >= query.count || exhausted {
                    break;
                }
                skip = 0;
                page += 1;
            }
            items.truncate(query.count);
            Ok(items)
        })
    }
}

pub fn is_valid_article(article: &NewsArticle) -> bool {
    let has = |value: &Option<String>| {
        value
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty() && text != REMOVED_MARKER)
    };
    has(&article.title) && has(&article.description)
}

pub fn shape_article(article: NewsArticle) -> SupplementItem {
    let title = article.title.unwrap_or_default().trim().to_string();
    let url = article.url.unwrap_or_default();
    let source_name = article
        .source
        .name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "Unknown Source".to_string());
    let published_at_ms = article
        .published_at
        .as_deref()
        .and_then(parse_published_at_ms)
        .unwrap_or_else(now_ms);

    SupplementItem {
        id: stable_external_id(&[&url, &title]),
        title,
        body: article.description.map(|text| text.trim().to_string()),
        source_name,
        external_url: (!url.is_empty()).then_some(url),
        image_url: article.url_to_image,
        published_at_ms,
    }
}

fn parse_published_at_ms(raw: &str) -> Option<i64> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .ok()
        .map(|value| (value.unix_timestamp_nanos() / 1_000_000) as i64)
}

/// Fixed-list source for tests and offline development. Serves items by
/// absolute offset and can be flipped into a failing state to exercise
/// degradation paths.
#[derive(Default)]
pub struct StaticSupplementSource {
    items: Arc<RwLock<Vec<SupplementItem>>>,
    failing: Arc<RwLock<bool>>,
}

impl StaticSupplementSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_items(&self, items: Vec<SupplementItem>) {
        *self.items.write().await = items;
    }

    pub async fn set_failing(&self, failing: bool) {
        *self.failing.write().await = failing;
    }
}

impl SupplementSource for StaticSupplementSource {
    fn fetch(&self, query: &SupplementQuery) -> BoxFuture<'_, DomainResult<Vec<SupplementItem>>> {
        let query = query.clone();
        let items = self.items.clone();
        let failing = self.failing.clone();
        Box::pin(async move {
            if *failing.read().await {
                return Err(DomainError::TransientSource(
                    "supplement source unavailable".into(),
                ));
            }
            let items = items.read().await;
            Ok(items
                .iter()
                .skip(query.offset)
                .take(query.count)
                .cloned()
                .collect())
        })
    }
}
