//! Data models for bill analysis.
//!
//! This module contains the bill data fetched from the legislative data
//! service and the typed finding records produced by the analysis stages.

use crate::analysis::ResponseSchema;
use crate::errors::ConfigError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Severity level of a finding.
///
/// Assigned by the severity guideline bands: fiscal exposure, scope,
/// oversight transparency and, for alignment findings, fit with the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Routine, germane, under $10 million, transparent mechanisms
    Low,
    /// Debatable, $10-100 million, partial oversight, mixed alignment
    Medium,
    /// Sweeping or open-ended, over $100 million, conflicts with core values
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
        }
    }
}

impl Severity {
    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Low => "🟢",
            Severity::Medium => "🟡",
            Severity::High => "🔴",
        }
    }
}

/// Identity of a bill in the legislative data service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillId {
    pub congress: u32,
    pub bill_type: String,
    pub number: u32,
}

const BILL_TYPES: &[&str] = &[
    "hr", "s", "hjres", "sjres", "hconres", "sconres", "hres", "sres",
];

impl BillId {
    /// Build a bill identity, normalizing the type (`H.R.` becomes `hr`).
    pub fn new(congress: u32, bill_type: &str, number: u32) -> Result<Self, ConfigError> {
        if congress == 0 {
            return Err(ConfigError::invalid("congress", "must be positive"));
        }
        if number == 0 {
            return Err(ConfigError::invalid("bill_number", "must be positive"));
        }

        let normalized: String = bill_type
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if normalized.is_empty() {
            return Err(ConfigError::Missing("bill_type"));
        }
        if !BILL_TYPES.contains(&normalized.as_str()) {
            return Err(ConfigError::invalid(
                "bill_type",
                format!("unknown bill type '{}'", bill_type),
            ));
        }

        Ok(Self {
            congress,
            bill_type: normalized,
            number,
        })
    }
}

impl fmt::Display for BillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.congress, self.bill_type, self.number)
    }
}

/// Bill metadata as reported by the legislative data service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillMetadata {
    pub title: String,
    pub congress: u32,
    pub number: String,
    pub bill_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_chamber: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introduced_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_action: Option<String>,
}

/// A bill sponsor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sponsor {
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bioguide_id: Option<String>,
}

/// An amendment filed against the bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amendment {
    pub number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amendment_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_action: Option<String>,
}

/// A news article or search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub content: String,
}

/// A structured analysis response with its own construction-time checks.
pub trait Structured: DeserializeOwned + Serialize + Clone + Send + 'static {
    /// Schema the analysis backend must conform to.
    const SCHEMA: ResponseSchema;

    /// Reject records with missing required content.
    fn validate(&self) -> Result<(), String>;
}

/// A single finding with a severity, usable for reporting and thresholds.
pub trait Finding {
    fn headline(&self) -> &str;
    fn severity(&self) -> Severity;
}

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("`{}` must not be empty", field))
    } else {
        Ok(())
    }
}

/// Change introduced by an amendment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub title: String,
    pub explanation: String,
    pub concern: String,
    pub severity: Severity,
}

/// Narrowly targeted spending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorkRecord {
    pub title: String,
    pub explanation: String,
    pub concern: String,
    pub severity: Severity,
    pub why: String,
}

/// Trojan-horse or sleeper provision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrojanHorseRecord {
    pub title: String,
    pub explanation: String,
    pub concern: String,
    pub severity: Severity,
    pub why: String,
}

/// Party that benefits from the bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeneficiaryRecord {
    pub name: String,
    pub benefit: String,
    pub severity: Severity,
}

/// Whether an alignment finding helps or hurts the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Benefit,
    Harm,
}

/// Who an alignment finding affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectScope {
    Me,
    Family,
    Community,
}

impl fmt::Display for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectScope::Me => write!(f, "Me"),
            EffectScope::Family => write!(f, "Family"),
            EffectScope::Community => write!(f, "Community"),
        }
    }
}

/// Effect of the bill on the user described by the profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRecord {
    pub benefit_or_harm: Impact,
    pub effect_type: EffectScope,
    pub summary: String,
    pub explanation: String,
    pub severity: Severity,
}

/// Alternative approach to the bill's spending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub alternative: String,
    pub explanation: String,
}

/// Document-level cost analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillCost {
    pub cost_explanation: String,
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

/// Container for a list of records, the shape every list response takes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Records<T> {
    #[serde(default = "Vec::new")]
    pub records: Vec<T>,
}

impl Finding for ChangeRecord {
    fn headline(&self) -> &str {
        &self.title
    }
    fn severity(&self) -> Severity {
        self.severity
    }
}

impl Finding for PorkRecord {
    fn headline(&self) -> &str {
        &self.title
    }
    fn severity(&self) -> Severity {
        self.severity
    }
}

impl Finding for TrojanHorseRecord {
    fn headline(&self) -> &str {
        &self.title
    }
    fn severity(&self) -> Severity {
        self.severity
    }
}

impl Finding for BeneficiaryRecord {
    fn headline(&self) -> &str {
        &self.name
    }
    fn severity(&self) -> Severity {
        self.severity
    }
}

impl Finding for AlignmentRecord {
    fn headline(&self) -> &str {
        &self.summary
    }
    fn severity(&self) -> Severity {
        self.severity
    }
}

impl Structured for Records<ChangeRecord> {
    const SCHEMA: ResponseSchema = ResponseSchema::ChangeRecords;

    fn validate(&self) -> Result<(), String> {
        self.records.iter().try_for_each(|r| {
            require("title", &r.title)?;
            require("explanation", &r.explanation)
        })
    }
}

impl Structured for Records<PorkRecord> {
    const SCHEMA: ResponseSchema = ResponseSchema::PorkRecords;

    fn validate(&self) -> Result<(), String> {
        self.records.iter().try_for_each(|r| {
            require("title", &r.title)?;
            require("why", &r.why)
        })
    }
}

impl Structured for Records<TrojanHorseRecord> {
    const SCHEMA: ResponseSchema = ResponseSchema::TrojanHorseRecords;

    fn validate(&self) -> Result<(), String> {
        self.records.iter().try_for_each(|r| {
            require("title", &r.title)?;
            require("why", &r.why)
        })
    }
}

impl Structured for Records<BeneficiaryRecord> {
    const SCHEMA: ResponseSchema = ResponseSchema::BeneficiaryRecords;

    fn validate(&self) -> Result<(), String> {
        self.records.iter().try_for_each(|r| {
            require("name", &r.name)?;
            require("benefit", &r.benefit)
        })
    }
}

impl Structured for Records<AlignmentRecord> {
    const SCHEMA: ResponseSchema = ResponseSchema::AlignmentRecords;

    fn validate(&self) -> Result<(), String> {
        self.records.iter().try_for_each(|r| require("summary", &r.summary))
    }
}

impl Structured for BillCost {
    const SCHEMA: ResponseSchema = ResponseSchema::BillCost;

    fn validate(&self) -> Result<(), String> {
        require("cost_explanation", &self.cost_explanation)?;
        self.alternatives
            .iter()
            .try_for_each(|a| require("alternative", &a.alternative))
    }
}

/// Multi-level summaries of the bill plus sponsor profiles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summaries {
    pub one_line: String,
    pub detailed: String,
    pub section_outline: String,
    /// Keyed by sponsor full name.
    pub sponsor_profiles: BTreeMap<String, String>,
}

impl Summaries {
    /// All non-empty summary levels joined, used as the bill's stated purpose.
    pub fn purpose(&self) -> String {
        [&self.one_line, &self.detailed, &self.section_outline]
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Analysis of one amendment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub amendment: Amendment,
    pub changes: Vec<ChangeRecord>,
}

/// Media coverage analysis from one search source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAnalysis {
    pub source: String,
    pub articles: Vec<Article>,
    pub analysis: String,
}

/// The four investigative finding sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvestigationFindings {
    pub pork_barrel_spending: Vec<PorkRecord>,
    pub trojan_horses: Vec<TrojanHorseRecord>,
    pub sleeper_provisions: Vec<TrojanHorseRecord>,
    pub beneficiaries: Vec<BeneficiaryRecord>,
}

impl InvestigationFindings {
    pub fn total(&self) -> usize {
        self.pork_barrel_spending.len()
            + self.trojan_horses.len()
            + self.sleeper_provisions.len()
            + self.beneficiaries.len()
    }

    /// Highest severity across all four sets.
    pub fn max_severity(&self) -> Option<Severity> {
        let pork = self.pork_barrel_spending.iter().map(Finding::severity);
        let trojans = self.trojan_horses.iter().map(Finding::severity);
        let sleepers = self.sleeper_provisions.iter().map(Finding::severity);
        let beneficiaries = self.beneficiaries.iter().map(Finding::severity);
        pork.chain(trojans).chain(sleepers).chain(beneficiaries).max()
    }
}

/// User-alignment findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentFindings {
    pub benefits: Vec<AlignmentRecord>,
    pub drawbacks: Vec<AlignmentRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_analysis: Option<BillCost>,
}

/// Summary counts of findings, by severity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindingSummary {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl FindingSummary {
    /// Creates a summary from any list of findings.
    pub fn from_findings<'a, F, I>(findings: I) -> Self
    where
        F: Finding + 'a,
        I: IntoIterator<Item = &'a F>,
    {
        let mut summary = Self::default();
        for finding in findings {
            summary.add(finding.severity());
        }
        summary
    }

    pub fn add(&mut self, severity: Severity) {
        self.total += 1;
        match severity {
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    pub fn merge(&mut self, other: &FindingSummary) {
        self.total += other.total;
        self.high += other.high;
        self.medium += other.medium;
        self.low += other.low;
    }
}

/// Impact scores on a 0-100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactScores {
    pub personal: u8,
    pub family: u8,
    pub community: u8,
    pub overall: u8,
    pub rationale: String,
}

impl Structured for ImpactScores {
    const SCHEMA: ResponseSchema = ResponseSchema::ImpactScores;

    fn validate(&self) -> Result<(), String> {
        for (name, score) in [
            ("personal", self.personal),
            ("family", self.family),
            ("community", self.community),
            ("overall", self.overall),
        ] {
            if score > 100 {
                return Err(format!("`{}` score {} is outside 0-100", name, score));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pork(severity: Severity) -> PorkRecord {
        PorkRecord {
            title: "Bridge to nowhere".to_string(),
            explanation: "Directed funding".to_string(),
            concern: "Bypasses competition".to_string(),
            severity,
            why: "Names a single recipient".to_string(),
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"high\"");
        let parsed: Severity = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(parsed, Severity::Medium);
        assert!(serde_json::from_str::<Severity>("\"critical\"").is_err());
    }

    #[test]
    fn test_bill_id_normalizes_type() {
        let id = BillId::new(119, "H.R.", 3852).unwrap();
        assert_eq!(id.bill_type, "hr");
        assert_eq!(id.to_string(), "119/hr/3852");

        assert!(BillId::new(119, "xyz", 1).is_err());
        assert!(BillId::new(0, "hr", 1).is_err());
        assert_eq!(
            BillId::new(119, "", 1).unwrap_err(),
            ConfigError::Missing("bill_type")
        );
    }

    #[test]
    fn test_records_validation() {
        let ok = Records {
            records: vec![pork(Severity::Low)],
        };
        assert!(ok.validate().is_ok());

        let mut bad = pork(Severity::Low);
        bad.why = "  ".to_string();
        let bad = Records { records: vec![bad] };
        assert!(bad.validate().unwrap_err().contains("why"));
    }

    #[test]
    fn test_missing_records_key_is_empty_list() {
        let records: Records<PorkRecord> = serde_json::from_str("{}").unwrap();
        assert!(records.records.is_empty());
        assert!(records.validate().is_ok());
    }

    #[test]
    fn test_alignment_record_round_trips_enums() {
        let json = serde_json::json!({
            "benefit_or_harm": "harm",
            "effect_type": "family",
            "summary": "Higher childcare costs",
            "explanation": "Section 4 removes a credit",
            "severity": "medium"
        });
        let record: AlignmentRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.benefit_or_harm, Impact::Harm);
        assert_eq!(record.effect_type, EffectScope::Family);
    }

    #[test]
    fn test_investigation_max_severity() {
        let mut findings = InvestigationFindings::default();
        assert_eq!(findings.max_severity(), None);

        findings.pork_barrel_spending.push(pork(Severity::Medium));
        findings.beneficiaries.push(BeneficiaryRecord {
            name: "Acme Corp".to_string(),
            benefit: "Exclusive contract".to_string(),
            severity: Severity::High,
        });
        assert_eq!(findings.total(), 2);
        assert_eq!(findings.max_severity(), Some(Severity::High));
    }

    #[test]
    fn test_finding_summary() {
        let records = vec![pork(Severity::High), pork(Severity::Low), pork(Severity::Low)];
        let summary = FindingSummary::from_findings(&records);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.high, 1);
        assert_eq!(summary.low, 2);
    }

    #[test]
    fn test_summaries_purpose_skips_empty_levels() {
        let summaries = Summaries {
            one_line: "H.R. 1 funds bridges.".to_string(),
            detailed: String::new(),
            section_outline: "- Title I".to_string(),
            sponsor_profiles: BTreeMap::new(),
        };
        assert_eq!(summaries.purpose(), "H.R. 1 funds bridges.\n\n- Title I");
    }

    #[test]
    fn test_impact_scores_range() {
        let mut scores = ImpactScores {
            personal: 40,
            family: 55,
            community: 70,
            overall: 60,
            rationale: "Mixed".to_string(),
        };
        assert!(scores.validate().is_ok());
        scores.overall = 140;
        assert!(scores.validate().is_err());
    }
}
