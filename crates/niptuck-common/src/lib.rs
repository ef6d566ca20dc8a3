pub mod credential;
pub mod error;
pub mod gemini;
pub mod kv;
pub mod mcp_api;
pub mod redis;
