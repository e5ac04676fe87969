pub mod achievements;
pub mod learning;
pub mod llm_provider;
pub mod productivity;
pub mod quiz;
pub mod streak;
pub mod xp;
