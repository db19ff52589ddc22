pub mod engine;
pub mod fallback;
pub mod llm_client;
pub mod prompt_builder;
pub mod protocol;
pub mod response_parser;
