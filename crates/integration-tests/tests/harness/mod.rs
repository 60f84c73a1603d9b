#![allow(dead_code)]

pub mod config;
pub mod mock_backend;
pub mod server;

/// `data:` payloads of an SSE body, in order
pub fn sse_data(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(ToOwned::to_owned)
        .collect()
}

/// Parsed JSON events of an SSE body, without the `[DONE]` sentinel
pub fn sse_events(text: &str) -> Vec<serde_json::Value> {
    sse_data(text)
        .into_iter()
        .filter(|data| data != "[DONE]")
        .map(|data| serde_json::from_str(&data).expect("event is JSON"))
        .collect()
}
