//! Backend-agnostic request and response types
//!
//! Both backends convert their wire formats to and from these types so the
//! gateway and the consultation pipeline never see protocol details.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;

pub use message::{Message, Role};
pub use request::{CompletionParams, CompletionRequest, GenerateOptions};
pub use response::{Choice, ChoiceMessage, CompletionResponse, FinishReason, Usage};
pub use stream::{StreamDelta, StreamEvent};
