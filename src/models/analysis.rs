use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::article::EnrichedArticle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Momentum {
    Accelerating,
    #[default]
    Stable,
    Decelerating,
}

impl Momentum {
    pub fn as_str(&self) -> &'static str {
        match self {
            Momentum::Accelerating => "accelerating",
            Momentum::Stable => "stable",
            Momentum::Decelerating => "decelerating",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "accelerating" => Momentum::Accelerating,
            "decelerating" => Momentum::Decelerating,
            _ => Momentum::Stable,
        }
    }
}

/// One cross-category trend detected by the analyst stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub name: String,
    pub sectors: Vec<String>,
    pub momentum: Momentum,
    pub analysis: String,
    /// 0..=100
    pub confidence: f64,
}

/// One per day, produced by the analyst stage from that day's enriched set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendReport {
    pub trends: Vec<Trend>,
    pub cross_category_insights: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeHorizon {
    Short,
    Medium,
    Long,
}

impl TimeHorizon {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "short" => TimeHorizon::Short,
            "long" => TimeHorizon::Long,
            _ => TimeHorizon::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Severity::Low,
            "high" => Severity::High,
            "critical" => Severity::Critical,
            _ => Severity::Medium,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub category: String,
    /// 0..=100
    pub score: f64,
    pub insight: String,
    pub tickers: Vec<String>,
    pub time_horizon: TimeHorizon,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Risk {
    pub factor: String,
    pub severity: Severity,
    pub affected_sectors: Vec<String>,
    pub mitigation: String,
}

/// Aggregate market mood. Overall and per-category values are -100..=100.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSentiment {
    pub overall: f64,
    pub by_category: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategistReport {
    pub opportunities: Vec<Opportunity>,
    pub risks: Vec<Risk>,
    pub market_sentiment: MarketSentiment,
}

/// The unit of persistence and retrieval for one day, keyed by date.
/// Later runs for the same date replace the earlier record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAnalysis {
    pub date: String,
    pub briefing: String,
    pub trend_report: TrendReport,
    pub strategist_report: StrategistReport,
    pub enriched_articles: Vec<EnrichedArticle>,
    pub generated_at: String,
}

/// Derived aggregate per (date, category); overwritten on recomputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentHistoryRecord {
    pub date: String,
    pub category: String,
    pub avg_sentiment: f64,
    pub article_count: u32,
    pub top_topics: Vec<String>,
    pub trend_momentum: Momentum,
}
