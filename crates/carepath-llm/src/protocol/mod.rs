//! Wire formats spoken by the supported backends

pub mod ollama;
pub mod openai;
