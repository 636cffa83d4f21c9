pub mod approval;
pub mod classify;
pub mod orchestrator;
pub mod paragraph;
pub mod pipeline;
pub mod prompts;
pub mod provider;
pub mod refine;
