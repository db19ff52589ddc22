pub mod approach;
pub mod catalog;
pub mod llm_decode;
pub mod message;
pub mod scenario;
pub mod session;
