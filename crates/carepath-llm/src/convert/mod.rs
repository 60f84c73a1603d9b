//! Conversion between internal types and backend wire formats

pub mod ollama;
pub mod openai;
