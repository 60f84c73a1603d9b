//! Conversion between internal types and Ollama wire format

use crate::protocol::ollama::{
    OllamaChatRequest, OllamaChatResponse, OllamaGenerateRequest, OllamaMessage, OllamaOptions,
};
use crate::types::{
    Choice, ChoiceMessage, CompletionParams, CompletionRequest, CompletionResponse, FinishReason, GenerateOptions,
    StreamDelta, StreamEvent, Usage, response::now_secs,
};

impl From<&CompletionParams> for OllamaOptions {
    fn from(params: &CompletionParams) -> Self {
        Self {
            temperature: params.temperature,
            num_predict: params.max_tokens,
            top_p: params.top_p,
            stop: params.stop.clone(),
        }
    }
}

/// Build an `/api/generate` body
pub fn generate_request(prompt: &str, options: &GenerateOptions, model: String, stream: bool) -> OllamaGenerateRequest {
    OllamaGenerateRequest {
        model,
        prompt: prompt.to_owned(),
        stream,
        options: OllamaOptions {
            temperature: Some(f64::from(options.temperature)),
            num_predict: Some(options.max_tokens),
            ..OllamaOptions::default()
        },
    }
}

/// Build an `/api/chat` body
pub fn chat_request(request: &CompletionRequest, model: String, stream: bool) -> OllamaChatRequest {
    OllamaChatRequest {
        model,
        messages: request
            .messages
            .iter()
            .map(|m| OllamaMessage {
                role: m.role.as_str().to_owned(),
                content: m.content.clone(),
            })
            .collect(),
        stream,
        options: (&request.params).into(),
    }
}

/// Convert a non-streamed chat response
pub fn chat_response_to_completion(response: OllamaChatResponse) -> CompletionResponse {
    let usage = usage_of(&response);
    let finish_reason = Some(finish_reason_of(&response));

    CompletionResponse {
        id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
        object: "chat.completion".to_owned(),
        created: now_secs(),
        model: response.model,
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage::text(response.message.map(|m| m.content).unwrap_or_default()),
            finish_reason,
        }],
        usage,
    }
}

/// Convert one NDJSON chat line to stream events
///
/// The final line yields a finishing delta, usage when reported, and `Done`.
pub fn chat_line_to_events(line: &OllamaChatResponse) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if let Some(message) = &line.message
        && !message.content.is_empty()
    {
        events.push(StreamEvent::Delta(StreamDelta::text(message.content.clone())));
    }

    if line.done {
        events.push(StreamEvent::Delta(StreamDelta::finished(finish_reason_of(line))));
        if let Some(usage) = usage_of(line) {
            events.push(StreamEvent::Usage(usage));
        }
        events.push(StreamEvent::Done);
    }

    events
}

fn finish_reason_of(response: &OllamaChatResponse) -> FinishReason {
    response
        .done_reason
        .as_deref()
        .map_or(FinishReason::Stop, FinishReason::from_wire)
}

fn usage_of(response: &OllamaChatResponse) -> Option<Usage> {
    match (response.prompt_eval_count, response.eval_count) {
        (None, None) => None,
        (prompt, completion) => {
            let prompt_tokens = prompt.unwrap_or(0);
            let completion_tokens = completion.unwrap_or(0);
            Some(Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    fn line(json: serde_json::Value) -> OllamaChatResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn max_tokens_maps_to_num_predict() {
        let options = GenerateOptions {
            model: None,
            temperature: 0.0,
            max_tokens: 1000,
        };

        let body = generate_request("code this", &options, "medgemma:27b".to_owned(), false);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["options"]["num_predict"], 1000);
        assert_eq!(json["stream"], false);
        assert_eq!(json["model"], "medgemma:27b");
    }

    #[test]
    fn chat_request_keeps_roles() {
        let request = CompletionRequest {
            model: String::new(),
            messages: vec![Message::system("sys"), Message::user("hi")],
            params: CompletionParams::default(),
            stream: true,
        };

        let body = chat_request(&request, "medgemma:27b".to_owned(), true);

        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[1].content, "hi");
        assert!(body.stream);
    }

    #[test]
    fn intermediate_line_is_a_text_delta() {
        let events = chat_line_to_events(&line(serde_json::json!({
            "model": "medgemma:27b",
            "message": {"role": "assistant", "content": "Hel"},
            "done": false
        })));

        assert_eq!(events, vec![StreamEvent::Delta(StreamDelta::text("Hel"))]);
    }

    #[test]
    fn final_line_finishes_the_stream() {
        let events = chat_line_to_events(&line(serde_json::json!({
            "model": "medgemma:27b",
            "message": {"role": "assistant", "content": ""},
            "done": true,
            "done_reason": "length",
            "prompt_eval_count": 10,
            "eval_count": 5
        })));

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], StreamEvent::Delta(StreamDelta::finished(FinishReason::Length)));
        assert!(matches!(events[1], StreamEvent::Usage(Usage { total_tokens: 15, .. })));
        assert_eq!(events[2], StreamEvent::Done);
    }

    #[test]
    fn non_streamed_chat_response() {
        let completion = chat_response_to_completion(line(serde_json::json!({
            "model": "medgemma:27b",
            "message": {"role": "assistant", "content": "{\"codes\": []}"},
            "done": true
        })));

        assert_eq!(completion.first_text(), Some("{\"codes\": []}"));
        assert_eq!(completion.choices[0].finish_reason, Some(FinishReason::Stop));
        assert!(completion.usage.is_none());
        assert!(completion.id.starts_with("chatcmpl-"));
    }
}
