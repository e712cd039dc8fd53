use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::models::analysis::{Momentum, Trend, TrendReport};
use crate::models::article::EnrichedArticle;
use crate::services::provider::{extract_json_object, AnalysisProvider, GenerateOptions};

#[derive(Debug, Deserialize)]
struct TrendEntry {
    name: String,
    #[serde(default)]
    sectors: Vec<String>,
    #[serde(default)]
    momentum: String,
    #[serde(default)]
    analysis: String,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct TrendReply {
    trends: Vec<TrendEntry>,
    #[serde(default)]
    cross_category_insights: String,
}

/// Per-category aggregates the analyst reasons over.
#[derive(Debug)]
pub struct CategorySummary {
    pub category: String,
    pub mean_sentiment: f64,
    pub article_count: usize,
}

/// Analyst stage: detects 3-5 cross-category macro trends from the day's
/// enriched set. Degrades to a single stable fallback trend, never aborts
/// the pipeline.
pub struct AnalystStage {
    provider: Arc<dyn AnalysisProvider>,
    options: GenerateOptions,
}

impl AnalystStage {
    pub fn new(provider: Arc<dyn AnalysisProvider>, options: GenerateOptions) -> Self {
        Self { provider, options }
    }

    pub async fn analyze(&self, articles: &[EnrichedArticle], briefing: &str) -> TrendReport {
        let summaries = summarize_categories(articles);
        if summaries.is_empty() {
            return fallback_report(&summaries, briefing);
        }

        let prompt = build_prompt(&summaries, articles);
        let reply = match self.provider.generate(&prompt, self.options).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("trend analysis failed, using fallback report: {}", e);
                return fallback_report(&summaries, briefing);
            }
        };

        match parse_reply(&reply) {
            Some(report) if !report.trends.is_empty() => report,
            _ => {
                tracing::warn!("unparsable trend response, using fallback report");
                fallback_report(&summaries, briefing)
            }
        }
    }
}

pub fn summarize_categories(articles: &[EnrichedArticle]) -> Vec<CategorySummary> {
    let mut by_category: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for a in articles {
        let entry = by_category
            .entry(a.article.category.clone())
            .or_insert((0.0, 0));
        entry.0 += a.sentiment_score;
        entry.1 += 1;
    }
    by_category
        .into_iter()
        .map(|(category, (sum, count))| CategorySummary {
            category,
            mean_sentiment: sum / count as f64,
            article_count: count,
        })
        .collect()
}

fn parse_reply(reply: &str) -> Option<TrendReport> {
    let json = extract_json_object(reply).ok()?;
    let parsed: TrendReply = serde_json::from_str(&json).ok()?;
    let trends = parsed
        .trends
        .into_iter()
        .filter(|t| !t.name.trim().is_empty())
        .map(|t| Trend {
            name: t.name,
            sectors: t.sectors,
            momentum: Momentum::parse(&t.momentum),
            analysis: t.analysis,
            confidence: t.confidence.clamp(0.0, 100.0),
        })
        .collect();
    Some(TrendReport {
        trends,
        cross_category_insights: parsed.cross_category_insights,
    })
}

/// Single stable trend covering all observed categories, confidence 50,
/// briefing text passed through unmodified as the insight.
fn fallback_report(summaries: &[CategorySummary], briefing: &str) -> TrendReport {
    let sectors: Vec<String> = summaries.iter().map(|s| s.category.clone()).collect();
    let name = if sectors.is_empty() {
        "Market activity".to_string()
    } else {
        format!("Market activity across {}", sectors.join(", "))
    };
    TrendReport {
        trends: vec![Trend {
            name,
            sectors,
            momentum: Momentum::Stable,
            analysis: "Automated trend detection was unavailable for this run.".to_string(),
            confidence: 50.0,
        }],
        cross_category_insights: briefing.to_string(),
    }
}

fn build_prompt(summaries: &[CategorySummary], articles: &[EnrichedArticle]) -> String {
    let stats = summaries
        .iter()
        .map(|s| {
            format!(
                "- {}: {} articles, mean sentiment {:.2}",
                s.category, s.article_count, s.mean_sentiment
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let highlights = articles
        .iter()
        .take(30)
        .map(|a| {
            format!(
                "[{}] {} (sentiment {:.2}, impact {:.0})",
                a.article.category, a.article.headline, a.sentiment_score, a.impact_score
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a macro analyst reviewing one day of enriched finance/tech news.\n\
        \n\
        Category statistics:\n{}\n\
        \n\
        Headlines:\n{}\n\
        \n\
        Identify 3 to 5 cross-category trends. Respond with ONLY a JSON object:\n\
        {{\"trends\": [{{\"name\": \"...\", \"sectors\": [\"...\"], \"momentum\": \"accelerating\"|\"stable\"|\"decelerating\", \"analysis\": \"...\", \"confidence\": 0-100}}], \"cross_category_insights\": \"...\"}}",
        stats, highlights
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::article::{NewsArticle, TrendDirection};
    use crate::services::provider::stub::StubProvider;

    fn enriched(category: &str, sentiment: f64) -> EnrichedArticle {
        EnrichedArticle {
            article: NewsArticle {
                ticker: "X".into(),
                headline: "h".into(),
                url: String::new(),
                source: "s".into(),
                category: category.into(),
            },
            sentiment_score: sentiment,
            impact_score: 50.0,
            key_entities: vec![],
            trend_direction: TrendDirection::Neutral,
        }
    }

    fn opts() -> GenerateOptions {
        GenerateOptions {
            temperature: 0.3,
            max_tokens: 1024,
        }
    }

    #[tokio::test]
    async fn fallback_covers_all_categories_with_briefing_as_insight() {
        let stage = AnalystStage::new(Arc::new(StubProvider::always_fail()), opts());
        let articles = vec![enriched("tech", 0.5), enriched("energy", -0.2)];
        let report = stage.analyze(&articles, "today's briefing text").await;

        assert_eq!(report.trends.len(), 1);
        let t = &report.trends[0];
        assert_eq!(t.momentum, Momentum::Stable);
        assert_eq!(t.confidence, 50.0);
        assert_eq!(t.sectors, vec!["energy".to_string(), "tech".to_string()]);
        assert_eq!(report.cross_category_insights, "today's briefing text");
    }

    #[tokio::test]
    async fn parses_model_trends() {
        let reply = r#"{"trends":[{"name":"AI capex","sectors":["tech"],"momentum":"accelerating","analysis":"...","confidence":80}],"cross_category_insights":"broad risk-on"}"#;
        let stage = AnalystStage::new(
            Arc::new(StubProvider::scripted(vec![reply.into()])),
            opts(),
        );
        let report = stage.analyze(&[enriched("tech", 0.4)], "briefing").await;

        assert_eq!(report.trends.len(), 1);
        assert_eq!(report.trends[0].momentum, Momentum::Accelerating);
        assert_eq!(report.cross_category_insights, "broad risk-on");
    }

    #[test]
    fn category_means() {
        let articles = vec![
            enriched("tech", 0.5),
            enriched("tech", -0.1),
            enriched("energy", 0.2),
        ];
        let summaries = summarize_categories(&articles);
        assert_eq!(summaries.len(), 2);
        let tech = summaries.iter().find(|s| s.category == "tech").unwrap();
        assert!((tech.mean_sentiment - 0.2).abs() < 1e-12);
        assert_eq!(tech.article_count, 2);
    }
}
