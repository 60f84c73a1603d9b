use http::StatusCode;

/// Domain error that knows how it should be presented over HTTP
///
/// Feature crates implement this for their error enums; handlers turn
/// them into responses with [`error_body`] so domain code never depends
/// on the web framework.
pub trait HttpError: std::error::Error {
    /// HTTP status code for this error
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error type (e.g. `invalid_request_error`)
    fn error_type(&self) -> &str;

    /// Message safe to expose to API consumers
    fn client_message(&self) -> String;
}

/// OpenAI-style JSON error body for an [`HttpError`]
pub fn error_body<E: HttpError + ?Sized>(error: &E) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "message": error.client_message(),
            "type": error.error_type(),
            "code": serde_json::Value::Null,
        }
    })
}
