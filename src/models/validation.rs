use serde::{Deserialize, Serialize};

/// One joined observation: a day's sentiment against the next trading
/// day's market return.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestDataPoint {
    pub date: String,
    pub sentiment_score: f64,
    pub market_return: f64,
    pub direction_match: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpr_score: Option<f64>,
}

/// Output of one backtest run. Recomputed from scratch on every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub period_start: String,
    pub period_end: String,
    /// 0..=100, percentage of days where the sentiment sign called the
    /// next day's return sign.
    pub sentiment_accuracy: f64,
    /// None when the correlation is undefined (constant series).
    pub pearson_correlation: Option<f64>,
    pub spearman_correlation: Option<f64>,
    pub gpr_correlation: Option<f64>,
    pub sample_size: u32,
    pub data_points: Vec<BacktestDataPoint>,
    pub is_empty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub calculated_at: String,
}

impl ValidationResult {
    /// The explicit "no data" shape clients can distinguish from a failure.
    pub fn empty(start: &str, end: &str, message: &str) -> Self {
        Self {
            period_start: start.to_string(),
            period_end: end.to_string(),
            sentiment_accuracy: 0.0,
            pearson_correlation: None,
            spearman_correlation: None,
            gpr_correlation: None,
            sample_size: 0,
            data_points: Vec::new(),
            is_empty: true,
            message: Some(message.to_string()),
            calculated_at: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
    #[serde(rename = "N/A")]
    NotAvailable,
}

impl Grade {
    /// Fixed letter-grade thresholds on direction accuracy.
    pub fn from_accuracy(accuracy: f64, sample_size: u32) -> Self {
        if sample_size == 0 {
            Grade::NotAvailable
        } else if accuracy >= 70.0 {
            Grade::A
        } else if accuracy >= 55.0 {
            Grade::B
        } else if accuracy >= 45.0 {
            Grade::C
        } else if accuracy >= 35.0 {
            Grade::D
        } else {
            Grade::F
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
            Grade::NotAvailable => "N/A",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "A" => Grade::A,
            "B" => Grade::B,
            "C" => Grade::C,
            "D" => Grade::D,
            "F" => Grade::F,
            _ => Grade::NotAvailable,
        }
    }
}

/// Aggregate of one calendar week of validator output. Append-only per
/// week; re-running within the same week overwrites that week's entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyReport {
    pub week_start: String,
    pub week_end: String,
    pub direction_accuracy: f64,
    pub pearson_r: Option<f64>,
    pub spearman_r: Option<f64>,
    pub sample_size: u32,
    pub avg_sentiment: f64,
    pub avg_return: f64,
    pub grade: Grade,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_boundaries() {
        assert_eq!(Grade::from_accuracy(70.0, 10), Grade::A);
        assert_eq!(Grade::from_accuracy(69.9, 10), Grade::B);
        assert_eq!(Grade::from_accuracy(55.0, 10), Grade::B);
        assert_eq!(Grade::from_accuracy(45.0, 10), Grade::C);
        assert_eq!(Grade::from_accuracy(35.0, 10), Grade::D);
        assert_eq!(Grade::from_accuracy(34.9, 10), Grade::F);
        assert_eq!(Grade::from_accuracy(100.0, 0), Grade::NotAvailable);
    }

    #[test]
    fn empty_result_carries_message_not_nan() {
        let r = ValidationResult::empty("2025-01-01", "2025-01-31", "no market data");
        assert!(r.is_empty);
        assert_eq!(r.sample_size, 0);
        assert!(r.pearson_correlation.is_none());
        assert!(r.spearman_correlation.is_none());
        let json = serde_json::to_string(&r).unwrap();
        assert!(!json.contains("NaN"));
    }
}
