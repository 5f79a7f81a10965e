pub mod base;
pub mod configs;
pub mod factory;
pub mod gemini;
pub mod kimi;
pub mod openrouter;
pub mod sse;
pub mod utils;

#[cfg(test)]
pub mod mock;
