use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::models::analysis::{
    MarketSentiment, Opportunity, Risk, Severity, StrategistReport, TimeHorizon, TrendReport,
};
use crate::models::article::{EnrichedArticle, TrendDirection};
use crate::services::provider::{extract_json_object, AnalysisProvider, GenerateOptions};

#[derive(Debug, Deserialize)]
struct OpportunityEntry {
    category: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    insight: String,
    #[serde(default)]
    tickers: Vec<String>,
    #[serde(default)]
    time_horizon: String,
}

#[derive(Debug, Deserialize)]
struct RiskEntry {
    factor: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    affected_sectors: Vec<String>,
    #[serde(default)]
    mitigation: String,
}

#[derive(Debug, Deserialize)]
struct SentimentEntry {
    #[serde(default)]
    overall: f64,
    #[serde(default)]
    by_category: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct StrategistReply {
    #[serde(default)]
    opportunities: Vec<OpportunityEntry>,
    #[serde(default)]
    risks: Vec<RiskEntry>,
    market_sentiment: Option<SentimentEntry>,
}

/// Per-category inputs the strategist scores against.
#[derive(Debug)]
struct CategoryProfile {
    mean_sentiment: f64,
    mean_impact: f64,
    bullish: usize,
    bearish: usize,
    top_tickers: Vec<String>,
}

/// Strategist stage: scored opportunities, risks with severity and an
/// aggregate market-sentiment read. The sentiment fallback is a pure
/// arithmetic aggregation and must be exact and reproducible.
pub struct StrategistStage {
    provider: Arc<dyn AnalysisProvider>,
    options: GenerateOptions,
}

impl StrategistStage {
    pub fn new(provider: Arc<dyn AnalysisProvider>, options: GenerateOptions) -> Self {
        Self { provider, options }
    }

    pub async fn strategize(
        &self,
        articles: &[EnrichedArticle],
        trend_report: &TrendReport,
    ) -> StrategistReport {
        let profiles = profile_categories(articles);
        if profiles.is_empty() {
            return fallback_report(&profiles);
        }

        let prompt = build_prompt(&profiles, trend_report);
        let reply = match self.provider.generate(&prompt, self.options).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("strategist request failed, using arithmetic fallback: {}", e);
                return fallback_report(&profiles);
            }
        };

        match parse_reply(&reply) {
            Some(report) => report,
            None => {
                tracing::warn!("unparsable strategist response, using arithmetic fallback");
                fallback_report(&profiles)
            }
        }
    }
}

fn profile_categories(articles: &[EnrichedArticle]) -> BTreeMap<String, CategoryProfile> {
    let mut grouped: BTreeMap<String, Vec<&EnrichedArticle>> = BTreeMap::new();
    for a in articles {
        grouped.entry(a.article.category.clone()).or_default().push(a);
    }

    grouped
        .into_iter()
        .map(|(category, group)| {
            let n = group.len() as f64;
            let mean_sentiment = group.iter().map(|a| a.sentiment_score).sum::<f64>() / n;
            let mean_impact = group.iter().map(|a| a.impact_score).sum::<f64>() / n;
            let bullish = group
                .iter()
                .filter(|a| a.trend_direction == TrendDirection::Bullish)
                .count();
            let bearish = group
                .iter()
                .filter(|a| a.trend_direction == TrendDirection::Bearish)
                .count();

            let mut top_tickers: Vec<String> = Vec::new();
            for a in &group {
                if !a.article.ticker.is_empty() && !top_tickers.contains(&a.article.ticker) {
                    top_tickers.push(a.article.ticker.clone());
                }
                if top_tickers.len() == 5 {
                    break;
                }
            }

            (
                category,
                CategoryProfile {
                    mean_sentiment,
                    mean_impact,
                    bullish,
                    bearish,
                    top_tickers,
                },
            )
        })
        .collect()
}

/// Deterministic sentiment from category means: overall is the rounded
/// mean of per-category means scaled to -100..100.
fn arithmetic_sentiment(profiles: &BTreeMap<String, CategoryProfile>) -> MarketSentiment {
    let by_category: BTreeMap<String, f64> = profiles
        .iter()
        .map(|(c, p)| (c.clone(), (p.mean_sentiment * 100.0).round()))
        .collect();

    let overall = if profiles.is_empty() {
        0.0
    } else {
        let mean_of_means =
            profiles.values().map(|p| p.mean_sentiment).sum::<f64>() / profiles.len() as f64;
        (mean_of_means * 100.0).round()
    };

    MarketSentiment {
        overall,
        by_category,
    }
}

fn fallback_report(profiles: &BTreeMap<String, CategoryProfile>) -> StrategistReport {
    StrategistReport {
        opportunities: Vec::new(),
        risks: Vec::new(),
        market_sentiment: arithmetic_sentiment(profiles),
    }
}

fn parse_reply(reply: &str) -> Option<StrategistReport> {
    let json = extract_json_object(reply).ok()?;
    let parsed: StrategistReply = serde_json::from_str(&json).ok()?;
    let sentiment = parsed.market_sentiment?;
    if !(-100.0..=100.0).contains(&sentiment.overall) {
        return None;
    }

    let opportunities = parsed
        .opportunities
        .into_iter()
        .filter(|o| !o.category.trim().is_empty())
        .map(|o| Opportunity {
            category: o.category,
            score: o.score.clamp(0.0, 100.0),
            insight: o.insight,
            tickers: o.tickers,
            time_horizon: TimeHorizon::parse(&o.time_horizon),
        })
        .collect();

    let risks = parsed
        .risks
        .into_iter()
        .filter(|r| !r.factor.trim().is_empty())
        .map(|r| Risk {
            factor: r.factor,
            severity: Severity::parse(&r.severity),
            affected_sectors: r.affected_sectors,
            mitigation: r.mitigation,
        })
        .collect();

    Some(StrategistReport {
        opportunities,
        risks,
        market_sentiment: MarketSentiment {
            overall: sentiment.overall,
            by_category: sentiment
                .by_category
                .into_iter()
                .map(|(c, v)| (c, v.clamp(-100.0, 100.0)))
                .collect(),
        },
    })
}

fn build_prompt(profiles: &BTreeMap<String, CategoryProfile>, trends: &TrendReport) -> String {
    let stats = profiles
        .iter()
        .map(|(c, p)| {
            format!(
                "- {}: sentiment {:.2}, impact {:.0}, {} bullish / {} bearish, tickers: {}",
                c,
                p.mean_sentiment,
                p.mean_impact,
                p.bullish,
                p.bearish,
                p.top_tickers.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let trend_lines = trends
        .trends
        .iter()
        .map(|t| format!("- {} ({:?}, confidence {:.0})", t.name, t.momentum, t.confidence))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an investment strategist. Today's category profiles:\n{}\n\
        \n\
        Detected trends:\n{}\n\
        \n\
        Respond with ONLY a JSON object:\n\
        {{\"opportunities\": [{{\"category\": \"...\", \"score\": 0-100, \"insight\": \"...\", \"tickers\": [\"...\"], \"time_horizon\": \"short\"|\"medium\"|\"long\"}}],\n\
        \"risks\": [{{\"factor\": \"...\", \"severity\": \"low\"|\"medium\"|\"high\"|\"critical\", \"affected_sectors\": [\"...\"], \"mitigation\": \"...\"}}],\n\
        \"market_sentiment\": {{\"overall\": -100 to 100, \"by_category\": {{\"category\": -100 to 100}}}}}}",
        stats, trend_lines
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::article::NewsArticle;
    use crate::services::provider::stub::StubProvider;

    fn enriched(category: &str, ticker: &str, sentiment: f64) -> EnrichedArticle {
        EnrichedArticle {
            article: NewsArticle {
                ticker: ticker.into(),
                headline: "h".into(),
                url: String::new(),
                source: "s".into(),
                category: category.into(),
            },
            sentiment_score: sentiment,
            impact_score: 60.0,
            key_entities: vec![],
            trend_direction: TrendDirection::Neutral,
        }
    }

    fn empty_trends() -> TrendReport {
        TrendReport {
            trends: vec![],
            cross_category_insights: String::new(),
        }
    }

    fn opts() -> GenerateOptions {
        GenerateOptions {
            temperature: 0.3,
            max_tokens: 1024,
        }
    }

    #[tokio::test]
    async fn fallback_sentiment_is_rounded_mean_of_category_means() {
        // tech mean = 0.5, energy mean = -0.2 -> mean of means = 0.15 -> 15
        let articles = vec![
            enriched("tech", "AAPL", 0.6),
            enriched("tech", "MSFT", 0.4),
            enriched("energy", "XOM", -0.2),
        ];
        let stage = StrategistStage::new(Arc::new(StubProvider::always_fail()), opts());
        let report = stage.strategize(&articles, &empty_trends()).await;

        assert!(report.opportunities.is_empty());
        assert!(report.risks.is_empty());
        assert_eq!(report.market_sentiment.overall, 15.0);
        assert_eq!(report.market_sentiment.by_category["tech"], 50.0);
        assert_eq!(report.market_sentiment.by_category["energy"], -20.0);
    }

    #[tokio::test]
    async fn parses_model_report() {
        let reply = r#"{
            "opportunities": [{"category":"tech","score":75,"insight":"ai demand","tickers":["NVDA"],"time_horizon":"medium"}],
            "risks": [{"factor":"rates","severity":"high","affected_sectors":["tech"],"mitigation":"duration hedge"}],
            "market_sentiment": {"overall": 22, "by_category": {"tech": 40}}
        }"#;
        let stage = StrategistStage::new(
            Arc::new(StubProvider::scripted(vec![reply.into()])),
            opts(),
        );
        let report = stage
            .strategize(&[enriched("tech", "NVDA", 0.4)], &empty_trends())
            .await;

        assert_eq!(report.opportunities.len(), 1);
        assert_eq!(report.risks.len(), 1);
        assert_eq!(report.risks[0].severity, Severity::High);
        assert_eq!(report.market_sentiment.overall, 22.0);
    }

    #[tokio::test]
    async fn out_of_range_overall_falls_back() {
        let reply = r#"{"opportunities":[],"risks":[],"market_sentiment":{"overall":250,"by_category":{}}}"#;
        let stage = StrategistStage::new(
            Arc::new(StubProvider::scripted(vec![reply.into()])),
            opts(),
        );
        let report = stage
            .strategize(&[enriched("tech", "NVDA", 0.5)], &empty_trends())
            .await;
        // arithmetic fallback: 0.5 * 100 = 50
        assert_eq!(report.market_sentiment.overall, 50.0);
        assert!(report.opportunities.is_empty());
    }

    #[test]
    fn top_tickers_are_distinct_and_capped() {
        let articles: Vec<EnrichedArticle> = ["A", "B", "A", "C", "D", "E", "F"]
            .iter()
            .map(|t| enriched("tech", t, 0.0))
            .collect();
        let profiles = profile_categories(&articles);
        let tech = &profiles["tech"];
        assert_eq!(tech.top_tickers, vec!["A", "B", "C", "D", "E"]);
    }
}
