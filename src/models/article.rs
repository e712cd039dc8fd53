use serde::{Deserialize, Serialize};

/// Raw headline record supplied by the article source, one per ticker/category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub ticker: String,
    pub headline: String,
    pub url: String,
    pub source: String,
    pub category: String,
}

impl NewsArticle {
    /// Stable identity of an article within one day. Re-running a date
    /// overwrites rows with the same key instead of duplicating them.
    pub fn article_key(&self) -> String {
        if !self.url.is_empty() {
            self.url.clone()
        } else {
            format!("{}::{}", self.ticker, self.headline)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Bullish => "bullish",
            TrendDirection::Bearish => "bearish",
            TrendDirection::Neutral => "neutral",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "bullish" => TrendDirection::Bullish,
            "bearish" => TrendDirection::Bearish,
            _ => TrendDirection::Neutral,
        }
    }
}

/// NewsArticle plus reader-stage enrichment. Created once per article per
/// day and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedArticle {
    #[serde(flatten)]
    pub article: NewsArticle,
    pub sentiment_score: f64,
    pub impact_score: f64,
    pub key_entities: Vec<String>,
    pub trend_direction: TrendDirection,
}

impl EnrichedArticle {
    /// Neutral enrichment used whenever the model response is missing,
    /// malformed or out of range for an article.
    pub fn neutral(article: NewsArticle) -> Self {
        Self {
            article,
            sentiment_score: 0.0,
            impact_score: 50.0,
            key_entities: Vec::new(),
            trend_direction: TrendDirection::Neutral,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_key_prefers_url() {
        let a = NewsArticle {
            ticker: "AAPL".into(),
            headline: "Apple ships something".into(),
            url: "https://example.com/a".into(),
            source: "wire".into(),
            category: "tech".into(),
        };
        assert_eq!(a.article_key(), "https://example.com/a");
    }

    #[test]
    fn article_key_falls_back_to_ticker_headline() {
        let a = NewsArticle {
            ticker: "AAPL".into(),
            headline: "Apple ships something".into(),
            url: String::new(),
            source: "wire".into(),
            category: "tech".into(),
        };
        assert_eq!(a.article_key(), "AAPL::Apple ships something");
    }

    #[test]
    fn neutral_enrichment_is_deterministic() {
        let a = NewsArticle {
            ticker: "TSLA".into(),
            headline: "h".into(),
            url: "u".into(),
            source: "s".into(),
            category: "ev".into(),
        };
        let e = EnrichedArticle::neutral(a.clone());
        assert_eq!(e.sentiment_score, 0.0);
        assert_eq!(e.impact_score, 50.0);
        assert!(e.key_entities.is_empty());
        assert_eq!(e.trend_direction, TrendDirection::Neutral);
    }

    #[test]
    fn trend_direction_parses_loosely() {
        assert_eq!(TrendDirection::parse(" Bullish "), TrendDirection::Bullish);
        assert_eq!(TrendDirection::parse("bearish"), TrendDirection::Bearish);
        assert_eq!(TrendDirection::parse("sideways"), TrendDirection::Neutral);
    }
}
