pub mod analyst;
pub mod backtest;
pub mod briefing;
pub mod market_data;
pub mod narrative;
pub mod pipeline;
pub mod provider;
pub mod reader;
pub mod scorecard;
pub mod strategist;
