pub mod analysis;
pub mod article;
pub mod llm;
pub mod narrative;
pub mod validation;
