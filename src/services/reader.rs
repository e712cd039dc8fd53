use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::sleep;

use crate::models::article::{EnrichedArticle, NewsArticle, TrendDirection};
use crate::services::provider::{extract_json_array, AnalysisProvider, GenerateOptions};

/// Per-article entry expected back from the enrichment request. Indices
/// are 1-based within the batch.
#[derive(Debug, Deserialize)]
struct EnrichmentEntry {
    index: usize,
    sentiment_score: f64,
    impact_score: f64,
    #[serde(default)]
    key_entities: Vec<String>,
    #[serde(default)]
    trend_direction: String,
}

/// Reader stage: sentiment/impact/entity/trend enrichment of raw
/// headlines, in fixed-size batches to bound prompt size. Never raises
/// past its boundary; every failure path degrades to neutral defaults.
pub struct ReaderStage {
    provider: Arc<dyn AnalysisProvider>,
    batch_size: usize,
    batch_delay_ms: u64,
    options: GenerateOptions,
}

impl ReaderStage {
    pub fn new(
        provider: Arc<dyn AnalysisProvider>,
        batch_size: usize,
        batch_delay_ms: u64,
        options: GenerateOptions,
    ) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            batch_delay_ms,
            options,
        }
    }

    /// Enrich all articles for one date. Output has the same length as the
    /// input and preserves article identity batch by batch.
    pub async fn enrich(&self, articles: &[NewsArticle]) -> Vec<EnrichedArticle> {
        let mut enriched = Vec::with_capacity(articles.len());
        let batches: Vec<&[NewsArticle]> = articles.chunks(self.batch_size).collect();
        let batch_count = batches.len();

        for (i, batch) in batches.into_iter().enumerate() {
            enriched.extend(self.enrich_batch(batch).await);

            // Courtesy pause toward the external model, not a correctness
            // boundary.
            if i + 1 < batch_count && self.batch_delay_ms > 0 {
                sleep(Duration::from_millis(self.batch_delay_ms)).await;
            }
        }

        enriched
    }

    async fn enrich_batch(&self, batch: &[NewsArticle]) -> Vec<EnrichedArticle> {
        let prompt = build_batch_prompt(batch);

        let reply = match self.provider.generate(&prompt, self.options).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("enrichment request failed, batch degrades to neutral: {}", e);
                return batch
                    .iter()
                    .map(|a| EnrichedArticle::neutral(a.clone()))
                    .collect();
            }
        };

        let entries: Vec<EnrichmentEntry> = match extract_json_array(&reply)
            .and_then(|s| serde_json::from_str(&s).map_err(Into::into))
        {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("unparsable enrichment response, batch degrades to neutral: {}", e);
                return batch
                    .iter()
                    .map(|a| EnrichedArticle::neutral(a.clone()))
                    .collect();
            }
        };

        batch
            .iter()
            .enumerate()
            .map(|(i, article)| {
                match entries.iter().find(|e| e.index == i + 1) {
                    Some(entry) => apply_entry(article, entry),
                    // The model skipped this index; neutral, not an error.
                    None => EnrichedArticle::neutral(article.clone()),
                }
            })
            .collect()
    }
}

/// Range-checked application of one model entry to its source article.
/// Out-of-range scores are rejected in favor of the neutral fallback.
fn apply_entry(article: &NewsArticle, entry: &EnrichmentEntry) -> EnrichedArticle {
    let in_range = (-1.0..=1.0).contains(&entry.sentiment_score)
        && (0.0..=100.0).contains(&entry.impact_score)
        && entry.sentiment_score.is_finite()
        && entry.impact_score.is_finite();

    if !in_range {
        return EnrichedArticle::neutral(article.clone());
    }

    EnrichedArticle {
        article: article.clone(),
        sentiment_score: entry.sentiment_score,
        impact_score: entry.impact_score,
        key_entities: entry
            .key_entities
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect(),
        trend_direction: TrendDirection::parse(&entry.trend_direction),
    }
}

fn build_batch_prompt(batch: &[NewsArticle]) -> String {
    let listing = batch
        .iter()
        .enumerate()
        .map(|(i, a)| {
            format!(
                "{}. [{}] {} — {} ({})",
                i + 1,
                a.category,
                a.ticker,
                a.headline,
                a.source
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a financial news analyst. For each numbered headline below, assess market sentiment and likely impact.\n\
        \n\
        Headlines:\n{}\n\
        \n\
        Respond with ONLY a JSON array, one object per headline, using the 1-based index shown:\n\
        [{{\"index\": 1, \"sentiment_score\": -1.0 to 1.0, \"impact_score\": 0 to 100, \"key_entities\": [\"...\"], \"trend_direction\": \"bullish\"|\"bearish\"|\"neutral\"}}]\n\
        Do not output anything else.",
        listing
    )
}
