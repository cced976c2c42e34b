pub mod breaker;
pub mod gate;
pub mod indicators;
pub mod llm;
pub mod oracle;
pub mod prompt;
pub mod risk;
