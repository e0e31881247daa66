//! External data sources: bill data and search.
//!
//! Bill data failures are fatal to a run. Search failures are not: a search
//! provider that cannot answer degrades to an empty result list.

mod congress;
mod search;

pub use congress::{CongressGovClient, DEFAULT_CONGRESS_API_URL};
pub use search::{NewsApiSearch, NoSearch, TavilySearch};

use crate::errors::DataSourceError;
use crate::models::{Amendment, Article, BillId, BillMetadata, Sponsor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Everything the legislative data service knows about one bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillRecord {
    pub metadata: BillMetadata,
    pub full_text: String,
    pub sponsors: Vec<Sponsor>,
    pub amendments: Vec<Amendment>,
    pub status: String,
}

/// Source of bill metadata, text, sponsors and amendments.
#[async_trait]
pub trait BillSource: Send + Sync {
    async fn fetch(&self, bill: &BillId) -> Result<BillRecord, DataSourceError>;
}

/// Web or news search.
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Provider name shown in reports.
    fn name(&self) -> &str;

    /// Run a query. Provider failures are logged and yield no results.
    async fn search(&self, query: &str) -> Vec<Article>;
}
