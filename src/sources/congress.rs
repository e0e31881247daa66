//! Congress.gov API v3 client.

use super::{BillRecord, BillSource};
use crate::errors::DataSourceError;
use crate::models::{Amendment, BillId, BillMetadata, Sponsor};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_CONGRESS_API_URL: &str = "https://api.congress.gov/v3";

/// Text formats in order of preference.
const TEXT_FORMATS: [&str; 2] = ["Formatted Text", "Formatted XML"];

#[derive(Debug, Deserialize)]
struct BillEnvelope {
    bill: BillDetail,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BillDetail {
    #[serde(default)]
    title: String,
    #[serde(default)]
    congress: u32,
    #[serde(default)]
    number: String,
    #[serde(default, rename = "type")]
    bill_type: String,
    origin_chamber: Option<String>,
    introduced_date: Option<String>,
    latest_action: Option<LatestAction>,
    #[serde(default)]
    sponsors: Vec<SponsorDetail>,
}

#[derive(Debug, Deserialize)]
struct LatestAction {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SponsorDetail {
    full_name: String,
    party: Option<String>,
    state: Option<String>,
    district: Option<u32>,
    bioguide_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextEnvelope {
    #[serde(default)]
    text_versions: Vec<TextVersion>,
}

#[derive(Debug, Deserialize)]
struct TextVersion {
    #[serde(default)]
    formats: Vec<TextFormat>,
}

#[derive(Debug, Deserialize)]
struct TextFormat {
    #[serde(rename = "type")]
    format_type: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct AmendmentEnvelope {
    #[serde(default)]
    amendments: Vec<AmendmentDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AmendmentDetail {
    number: String,
    #[serde(rename = "type")]
    amendment_type: Option<String>,
    description: Option<String>,
    purpose: Option<String>,
    latest_action: Option<LatestAction>,
}

impl From<SponsorDetail> for Sponsor {
    fn from(s: SponsorDetail) -> Self {
        Sponsor {
            full_name: s.full_name,
            party: s.party,
            state: s.state,
            district: s.district,
            bioguide_id: s.bioguide_id,
        }
    }
}

impl From<AmendmentDetail> for Amendment {
    fn from(a: AmendmentDetail) -> Self {
        Amendment {
            number: a.number,
            amendment_type: a.amendment_type,
            description: a.description,
            purpose: a.purpose,
            latest_action: a.latest_action.map(|l| l.text),
        }
    }
}

/// Client for the Congress.gov bill endpoints.
pub struct CongressGovClient {
    base_url: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl CongressGovClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DataSourceError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataSourceError::Unavailable(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            http_client,
        })
    }

    fn bill_url(&self, bill: &BillId, suffix: &str) -> String {
        format!(
            "{}/bill/{}/{}/{}{}",
            self.base_url, bill.congress, bill.bill_type, bill.number, suffix
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, bill: &BillId, suffix: &str) -> Result<T, DataSourceError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            DataSourceError::Unavailable("no Congress.gov API key configured".to_string())
        })?;
        let url = self.bill_url(bill, suffix);
        debug!("GET {}", url);

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", api_key), ("format", "json")])
            .send()
            .await
            .map_err(|e| DataSourceError::Unavailable(format!("request to {} failed: {}", url, e)))?;

        check_status(response.status(), &format!("bill {}{}", bill, suffix))?;

        response
            .json()
            .await
            .map_err(|e| DataSourceError::Unavailable(format!("unexpected response from {}: {}", url, e)))
    }

    async fn fetch_text(&self, bill: &BillId) -> Result<String, DataSourceError> {
        let envelope: TextEnvelope = self.get_json(bill, "/text").await?;
        let url = select_text_url(&envelope.text_versions)
            .ok_or_else(|| DataSourceError::NotFound(format!("no text published for bill {}", bill)))?;

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| DataSourceError::Unavailable(format!("failed to download bill text: {}", e)))?;
        check_status(response.status(), &format!("text of bill {}", bill))?;

        response
            .text()
            .await
            .map_err(|e| DataSourceError::Unavailable(format!("failed to read bill text: {}", e)))
    }
}

fn check_status(status: StatusCode, what: &str) -> Result<(), DataSourceError> {
    if status == StatusCode::NOT_FOUND {
        Err(DataSourceError::NotFound(what.to_string()))
    } else if !status.is_success() {
        Err(DataSourceError::Unavailable(format!("{} returned HTTP {}", what, status)))
    } else {
        Ok(())
    }
}

/// URL of the first text version, preferring formatted text over XML.
fn select_text_url(versions: &[TextVersion]) -> Option<&str> {
    let first = versions.iter().find(|v| !v.formats.is_empty())?;
    TEXT_FORMATS.iter().find_map(|wanted| {
        first
            .formats
            .iter()
            .find(|f| f.format_type == *wanted)
            .map(|f| f.url.as_str())
    })
}

#[async_trait]
impl BillSource for CongressGovClient {
    async fn fetch(&self, bill: &BillId) -> Result<BillRecord, DataSourceError> {
        info!("Fetching bill {} from Congress.gov", bill);

        let envelope: BillEnvelope = self.get_json(bill, "").await?;
        let full_text = self.fetch_text(bill).await?;
        let amendments: AmendmentEnvelope = self.get_json(bill, "/amendments").await?;

        let detail = envelope.bill;
        let status = detail
            .latest_action
            .as_ref()
            .map(|a| a.text.clone())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());

        let metadata = BillMetadata {
            title: detail.title,
            congress: detail.congress,
            number: detail.number,
            bill_type: detail.bill_type,
            origin_chamber: detail.origin_chamber,
            introduced_date: detail.introduced_date,
            latest_action: detail.latest_action.map(|a| a.text),
        };

        info!(
            "Fetched bill {}: {} words, {} sponsors, {} amendments",
            bill,
            full_text.split_whitespace().count(),
            detail.sponsors.len(),
            amendments.amendments.len()
        );

        Ok(BillRecord {
            metadata,
            full_text,
            sponsors: detail.sponsors.into_iter().map(Sponsor::from).collect(),
            amendments: amendments.amendments.into_iter().map(Amendment::from).collect(),
            status,
        })
    }
}
