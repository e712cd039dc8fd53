use serde::{Deserialize, Serialize};

/// Aggregated cluster of one day's articles for one category. This is the
/// persisted unit the narrative tracker links across days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleCluster {
    pub id: String,
    pub date: String,
    pub category: String,
    pub topic: String,
    pub entities: Vec<String>,
    pub avg_sentiment: f64,
    pub article_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Escalation {
    Rising,
    #[default]
    Stable,
    Declining,
}

impl Escalation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Escalation::Rising => "rising",
            Escalation::Stable => "stable",
            Escalation::Declining => "declining",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "rising" => Escalation::Rising,
            "declining" => Escalation::Declining,
            _ => Escalation::Stable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    #[default]
    Active,
    Resolved,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadStatus::Active => "active",
            ThreadStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "resolved" => ThreadStatus::Resolved,
            _ => ThreadStatus::Active,
        }
    }
}

/// A persistent story line linking article clusters across days.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeThread {
    pub id: String,
    pub title: String,
    pub category: String,
    pub first_seen: String,
    pub last_seen: String,
    pub duration_days: u32,
    pub cluster_ids: Vec<String>,
    /// Per-day aggregate sentiment, oldest first.
    pub sentiment_arc: Vec<f64>,
    pub entities: Vec<String>,
    pub escalation: Escalation,
    pub status: ThreadStatus,
}
