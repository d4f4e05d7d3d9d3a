//! Generation service seam: request/response types, the `Generator` trait,
//! and the timeout + cancellation wrapper around a call.

use crate::scan::GenerateRequest;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("generation timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("generation aborted by a newer request")]
    Aborted,

    #[error("generation service error: {message}")]
    Service { message: String, retryable: bool },
}

impl GenerationError {
    pub fn retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Aborted => true,
            Self::Service { retryable, .. } => *retryable,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GapFill {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum GenerateResponse {
    Gaps {
        gaps: Vec<GapFill>,
    },
    SmartEdit {
        #[serde(rename = "editedDocument")]
        edited_document: String,
    },
}

/// Black-box text generation service.
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<GenerateResponse, GenerationError>;
}

/// Call `generator`, giving up after `timeout` or when `cancel` fires.
/// A timeout also cancels the token so the service can stop work.
pub async fn run_generation(
    generator: &dyn Generator,
    request: &GenerateRequest,
    timeout: Duration,
    cancel: CancellationToken,
) -> Result<GenerateResponse, GenerationError> {
    if cancel.is_cancelled() {
        return Err(GenerationError::Aborted);
    }
    tokio::select! {
        result = generator.generate(request, cancel.clone()) => result,
        _ = tokio::time::sleep(timeout) => {
            cancel.cancel();
            tracing::warn!(secs = timeout.as_secs(), mode = request.mode.as_str(), "generation timed out");
            Err(GenerationError::Timeout { secs: timeout.as_secs() })
        }
        _ = cancel.cancelled() => Err(GenerationError::Aborted),
    }
}

/// Mock generator for testing. Pops queued results in order; once the
/// queue is empty every call fails with a non-retryable service error.
pub struct MockGenerator {
    responses: std::sync::Mutex<VecDeque<Result<GenerateResponse, GenerationError>>>,
    requests: std::sync::Mutex<Vec<GenerateRequest>>,
    delay: Option<Duration>,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(VecDeque::new()),
            requests: std::sync::Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Simulate service latency before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, result: Result<GenerateResponse, GenerationError>) {
        self.responses.lock().unwrap().push_back(result);
    }

    pub fn push_gaps(&self, fills: &[(&str, &str)]) {
        let gaps = fills
            .iter()
            .map(|(id, text)| GapFill {
                id: id.to_string(),
                text: text.to_string(),
            })
            .collect();
        self.push(Ok(GenerateResponse::Gaps { gaps }));
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Generator for MockGenerator {
    async fn generate(
        &self,
        request: &GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<GenerateResponse, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(GenerationError::Aborted),
            }
        }
        if cancel.is_cancelled() {
            return Err(GenerationError::Aborted);
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(GenerationError::Service {
                    message: "no response queued".into(),
                    retryable: false,
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::GenerateMode;

    fn request() -> GenerateRequest {
        GenerateRequest {
            goal: "g".into(),
            document: "[GAP:abc]".into(),
            gaps: Vec::new(),
            constraints: Vec::new(),
            user_request: None,
            mode: GenerateMode::Regenerate,
        }
    }

    #[test]
    fn response_shapes_parse() {
        let gaps: GenerateResponse =
            serde_json::from_str(r#"{"gaps":[{"id":"abc","text":"new"}]}"#).unwrap();
        assert!(matches!(gaps, GenerateResponse::Gaps { gaps } if gaps[0].text == "new"));

        let edit: GenerateResponse =
            serde_json::from_str(r#"{"editedDocument":"All new."}"#).unwrap();
        assert_eq!(
            edit,
            GenerateResponse::SmartEdit {
                edited_document: "All new.".into()
            }
        );
    }

    #[test]
    fn retryable_flags() {
        assert!(GenerationError::Timeout { secs: 30 }.retryable());
        assert!(GenerationError::Aborted.retryable());
        let hard = GenerationError::Service {
            message: "bad request".into(),
            retryable: false,
        };
        assert!(!hard.retryable());
    }

    #[tokio::test]
    async fn mock_returns_queued_response() {
        let generator = MockGenerator::new();
        generator.push_gaps(&[("abc", "filled")]);
        let out = run_generation(
            &generator,
            &request(),
            Duration::from_secs(30),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(matches!(out, GenerateResponse::Gaps { .. }));
        assert_eq!(generator.requests().len(), 1);

        let err = run_generation(
            &generator,
            &request(),
            Duration::from_secs(30),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(!err.retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_service_times_out() {
        let generator = MockGenerator::new().with_delay(Duration::from_secs(60));
        generator.push_gaps(&[("abc", "late")]);
        let cancel = CancellationToken::new();
        let err = run_generation(&generator, &request(), Duration::from_secs(15), cancel.clone())
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Timeout { secs: 15 });
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_request_is_aborted() {
        let generator = MockGenerator::new();
        generator.push_gaps(&[("abc", "x")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run_generation(&generator, &request(), Duration::from_secs(30), cancel)
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Aborted);
        assert!(generator.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn superseding_cancel_aborts_in_flight_call() {
        let generator = MockGenerator::new().with_delay(Duration::from_secs(10));
        generator.push_gaps(&[("abc", "x")]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let err = run_generation(&generator, &request(), Duration::from_secs(30), cancel)
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Aborted);
    }
}
