use async_trait::async_trait;
use reqwest::Client;

use crate::services::backtest::DailyReturn;
use crate::utils::http::build_market_client;

/// Supplies the reference-instrument return series a backtest joins
/// against. Implementations report trouble as an empty series.
#[async_trait]
pub trait ReturnSource: Send + Sync {
    async fn daily_returns(&self, symbol: &str, start: &str, end: &str) -> Vec<DailyReturn>;
}

/// Free daily OHLC CSV from stooq.com.
pub struct StooqSource {
    client: Client,
}

impl StooqSource {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            client: build_market_client()?,
        })
    }
}

#[async_trait]
impl ReturnSource for StooqSource {
    async fn daily_returns(&self, symbol: &str, start: &str, end: &str) -> Vec<DailyReturn> {
        let url = format!(
            "https://stooq.com/q/d/l/?s={}&d1={}&d2={}&i=d",
            symbol,
            start.replace('-', ""),
            end.replace('-', "")
        );

        let body = match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("stooq body read failed for {}: {}", symbol, e);
                    return Vec::new();
                }
            },
            Ok(resp) => {
                tracing::warn!("stooq returned {} for {}", resp.status(), symbol);
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("stooq request failed for {}: {}", symbol, e);
                return Vec::new();
            }
        };

        let returns = parse_daily_csv(&body);
        if returns.is_empty() {
            tracing::warn!("stooq returned no usable rows for {} ({} to {})", symbol, start, end);
        }
        returns
    }
}

/// Parses stooq's `Date,Open,High,Low,Close,Volume` CSV into
/// day-over-day close returns. Malformed rows are skipped.
fn parse_daily_csv(body: &str) -> Vec<DailyReturn> {
    let mut closes: Vec<(String, f64)> = Vec::new();
    for line in body.lines().skip(1) {
        let cols: Vec<&str> = line.split(',').collect();
        if cols.len() < 5 {
            continue;
        }
        let date = cols[0].trim();
        let close: f64 = match cols[4].trim().parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        if date.len() == 10 && close > 0.0 {
            closes.push((date.to_string(), close));
        }
    }
    closes.sort_by(|a, b| a.0.cmp(&b.0));

    closes
        .windows(2)
        .map(|w| DailyReturn {
            date: w[1].0.clone(),
            ret: w[1].1 / w[0].1 - 1.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_closes_into_returns() {
        let csv = "Date,Open,High,Low,Close,Volume\n\
                   2025-06-02,100,101,99,100.0,1000\n\
                   2025-06-03,100,103,100,102.0,1000\n\
                   2025-06-04,102,102,98,99.96,1000\n";
        let returns = parse_daily_csv(csv);
        assert_eq!(returns.len(), 2);
        assert_eq!(returns[0].date, "2025-06-03");
        assert!((returns[0].ret - 0.02).abs() < 1e-9);
        assert!((returns[1].ret + 0.02).abs() < 1e-9);
    }

    #[test]
    fn skips_malformed_rows() {
        let csv = "Date,Open,High,Low,Close,Volume\n\
                   2025-06-02,100,101,99,100.0,1000\n\
                   not,a,row\n\
                   2025-06-03,100,103,100,N/D,1000\n\
                   2025-06-04,102,102,98,101.0,1000\n";
        let returns = parse_daily_csv(csv);
        assert_eq!(returns.len(), 1);
        assert_eq!(returns[0].date, "2025-06-04");
    }

    #[test]
    fn empty_body_is_empty_series() {
        assert!(parse_daily_csv("").is_empty());
        assert!(parse_daily_csv("Date,Open,High,Low,Close,Volume\n").is_empty());
    }
}
