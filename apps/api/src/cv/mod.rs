// Profile extraction: résumé text → validated `Profile`.
// All LLM calls go through llm_client; no direct provider calls here.

pub mod contract;
pub mod handlers;
pub mod prompts;
