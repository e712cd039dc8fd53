use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::article::NewsArticle;
use crate::services::provider::{AnalysisProvider, GenerateOptions};

/// Briefing generator: one prose summary per day, written from the raw
/// headlines. Runs independently of the enrichment pipeline; a reader
/// failure never blocks the briefing and vice versa.
pub struct BriefingGenerator {
    provider: Arc<dyn AnalysisProvider>,
    options: GenerateOptions,
}

impl BriefingGenerator {
    pub fn new(provider: Arc<dyn AnalysisProvider>, options: GenerateOptions) -> Self {
        Self { provider, options }
    }

    pub async fn generate(&self, date: &str, articles: &[NewsArticle]) -> String {
        if articles.is_empty() {
            return fallback_briefing(date, articles);
        }

        let prompt = build_prompt(date, articles);
        match self.provider.generate(&prompt, self.options).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                tracing::warn!("empty briefing response, using templated fallback");
                fallback_briefing(date, articles)
            }
            Err(e) => {
                tracing::warn!("briefing request failed, using templated fallback: {}", e);
                fallback_briefing(date, articles)
            }
        }
    }
}

fn group_by_category(articles: &[NewsArticle]) -> BTreeMap<String, Vec<&NewsArticle>> {
    let mut grouped: BTreeMap<String, Vec<&NewsArticle>> = BTreeMap::new();
    for a in articles {
        grouped.entry(a.category.clone()).or_default().push(a);
    }
    grouped
}

/// Deterministic template used whenever the model is unavailable.
pub fn fallback_briefing(date: &str, articles: &[NewsArticle]) -> String {
    let grouped = group_by_category(articles);
    let categories: Vec<String> = grouped
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(c, _)| c.clone())
        .collect();

    if categories.is_empty() {
        format!("No market-moving news was available for {}.", date)
    } else {
        format!(
            "Market briefing for {}: automated narrative generation was unavailable. {} headlines were collected across {}.",
            date,
            articles.len(),
            categories.join(", ")
        )
    }
}

fn build_prompt(date: &str, articles: &[NewsArticle]) -> String {
    let grouped = group_by_category(articles);
    let sections = grouped
        .iter()
        .map(|(category, items)| {
            let lines = items
                .iter()
                .map(|a| format!("  - {} ({})", a.headline, a.ticker))
                .collect::<Vec<_>>()
                .join("\n");
            format!("{}:\n{}", category, lines)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Write a daily market briefing for {} from the headlines below.\n\
        \n\
        {}\n\
        \n\
        Requirements: 250-350 words of flowing prose. Open with the single most significant story, \
        connect developments across sectors where they relate, and close with a forward-looking note \
        on what to watch next. No bullet points, no headings.",
        date, sections
    )
}
