//! Conversion between internal types and `OpenAI` wire format

use crate::protocol::openai::{
    OpenAiChoice, OpenAiChoiceMessage, OpenAiMessage, OpenAiRequest, OpenAiResponse, OpenAiStreamChoice,
    OpenAiStreamChunk, OpenAiStreamDelta, OpenAiUsage,
};
use crate::types::{
    Choice, ChoiceMessage, CompletionParams, CompletionRequest, CompletionResponse, FinishReason, Message, Role,
    StreamDelta, StreamEvent, Usage,
};

// -- Inbound: OpenAI wire format -> internal types --

impl From<OpenAiRequest> for CompletionRequest {
    fn from(req: OpenAiRequest) -> Self {
        Self {
            model: req.model,
            messages: req
                .messages
                .into_iter()
                .map(|m| Message {
                    role: Role::from_wire(&m.role),
                    content: m.content.unwrap_or_default(),
                })
                .collect(),
            params: CompletionParams {
                temperature: req.temperature,
                top_p: req.top_p,
                max_tokens: req.max_tokens,
                stop: req.stop,
            },
            stream: req.stream.unwrap_or(false),
        }
    }
}

impl From<OpenAiResponse> for CompletionResponse {
    fn from(resp: OpenAiResponse) -> Self {
        Self {
            id: resp.id,
            object: resp.object,
            created: resp.created,
            model: resp.model,
            choices: resp
                .choices
                .into_iter()
                .map(|c| Choice {
                    index: c.index,
                    message: ChoiceMessage {
                        role: c.message.role,
                        content: c.message.content,
                    },
                    finish_reason: c.finish_reason.as_deref().map(FinishReason::from_wire),
                })
                .collect(),
            usage: resp.usage.map(Into::into),
        }
    }
}

impl From<OpenAiUsage> for Usage {
    fn from(usage: OpenAiUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// Convert an upstream stream chunk to internal stream events
pub fn openai_chunk_to_events(chunk: &OpenAiStreamChunk) -> Vec<StreamEvent> {
    let mut events: Vec<StreamEvent> = chunk
        .choices
        .iter()
        .map(|choice| {
            StreamEvent::Delta(StreamDelta {
                index: choice.index,
                content: choice.delta.content.clone(),
                finish_reason: choice.finish_reason.as_deref().map(FinishReason::from_wire),
            })
        })
        .collect();

    if let Some(usage) = chunk.usage {
        events.push(StreamEvent::Usage(usage.into()));
    }

    events
}

// -- Outbound: internal types -> OpenAI wire format --

impl From<&CompletionRequest> for OpenAiRequest {
    fn from(req: &CompletionRequest) -> Self {
        Self {
            model: req.model.clone(),
            messages: req
                .messages
                .iter()
                .map(|m| OpenAiMessage {
                    role: m.role.as_str().to_owned(),
                    content: Some(m.content.clone()),
                })
                .collect(),
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            max_tokens: req.params.max_tokens,
            stop: req.params.stop.clone(),
            stream: req.stream.then_some(true),
        }
    }
}

impl From<CompletionResponse> for OpenAiResponse {
    fn from(resp: CompletionResponse) -> Self {
        Self {
            id: resp.id,
            object: resp.object,
            created: resp.created,
            model: resp.model,
            choices: resp
                .choices
                .into_iter()
                .map(|c| OpenAiChoice {
                    index: c.index,
                    message: OpenAiChoiceMessage {
                        role: c.message.role,
                        content: c.message.content,
                    },
                    finish_reason: c.finish_reason.map(|fr| fr.as_str().to_owned()),
                })
                .collect(),
            usage: resp.usage.map(Into::into),
        }
    }
}

impl From<Usage> for OpenAiUsage {
    fn from(usage: Usage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// Convert an internal stream delta to an `OpenAI` stream chunk
pub fn delta_to_openai_chunk(delta: &StreamDelta, id: &str, model: &str, created: u64) -> OpenAiStreamChunk {
    OpenAiStreamChunk {
        id: id.to_owned(),
        object: "chat.completion.chunk".to_owned(),
        created,
        model: model.to_owned(),
        choices: vec![OpenAiStreamChoice {
            index: delta.index,
            delta: OpenAiStreamDelta {
                role: None,
                content: delta.content.clone(),
            },
            finish_reason: delta.finish_reason.map(|fr| fr.as_str().to_owned()),
        }],
        usage: None,
    }
}

/// Convert final usage to an `OpenAI` stream chunk with no choices
pub fn usage_to_openai_chunk(usage: Usage, id: &str, model: &str, created: u64) -> OpenAiStreamChunk {
    OpenAiStreamChunk {
        id: id.to_owned(),
        object: "chat.completion.chunk".to_owned(),
        created,
        model: model.to_owned(),
        choices: Vec::new(),
        usage: Some(usage.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roles_and_defaults() {
        let wire: OpenAiRequest = serde_json::from_value(serde_json::json!({
            "model": "phraser",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hello"},
                {"role": "tool"}
            ]
        }))
        .unwrap();

        let request: CompletionRequest = wire.into();

        assert_eq!(request.model, "phraser");
        assert!(!request.stream);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[2].role, Role::User);
        assert_eq!(request.messages[2].content, "");
    }

    #[test]
    fn chunk_with_finish_reason_and_usage() {
        let chunk: OpenAiStreamChunk = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "object": "chat.completion.chunk",
            "created": 1,
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "length"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
        }))
        .unwrap();

        let events = openai_chunk_to_events(&chunk);

        assert_eq!(
            events,
            vec![
                StreamEvent::Delta(StreamDelta::finished(FinishReason::Length)),
                StreamEvent::Usage(Usage {
                    prompt_tokens: 3,
                    completion_tokens: 4,
                    total_tokens: 7,
                }),
            ]
        );
    }

    #[test]
    fn outbound_request_omits_stream_when_false() {
        let request = CompletionRequest {
            model: "gpt-4o-mini".to_owned(),
            messages: vec![Message::user("hi")],
            params: CompletionParams::default(),
            stream: false,
        };

        let wire = OpenAiRequest::from(&request);
        let json = serde_json::to_value(&wire).unwrap();

        assert!(json.get("stream").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
