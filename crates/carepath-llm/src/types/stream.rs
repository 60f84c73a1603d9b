use serde::{Deserialize, Serialize};

use super::response::{FinishReason, Usage};

/// Item of a streamed chat completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Incremental content delta
    Delta(StreamDelta),
    /// Final usage statistics
    Usage(Usage),
    /// Stream has completed
    Done,
}

/// Incremental update within a streaming response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDelta {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Present on the final delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl StreamDelta {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            index: 0,
            content: Some(content.into()),
            finish_reason: None,
        }
    }

    pub const fn finished(reason: FinishReason) -> Self {
        Self {
            index: 0,
            content: None,
            finish_reason: Some(reason),
        }
    }
}
