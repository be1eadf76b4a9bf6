//! Request/response shapes exchanged with clients.
//!
//! Failures never leak internal details: a request that cannot be parsed
//! gets a generic degraded response instead.

use rand::Rng;
use serde::{Deserialize, Serialize};

use reply_engine::sampler::MAX_NEW_TOKENS;
use reply_engine::{GenerationRequest, Orchestrator, Reply, SamplingParams};

/// Shown when the pipeline produced a blank reply.
pub const NO_ANSWER_REPLY: &str =
    "Mình chưa nghĩ ra câu trả lời phù hợp từ dữ liệu đã học, bạn thử hỏi lại cách khác nha.";
/// Shown when a request could not be handled.
pub const DEGRADED_REPLY: &str = "Xin lỗi, hệ thống đang bận. Bạn thử lại sau nhé.";
pub const DEGRADED_MODE: &str = "degraded";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(default)]
    pub max_new: Option<usize>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

impl ChatRequest {
    /// Parse one JSON request; a blank prompt is rejected like a malformed one.
    pub fn parse(line: &str) -> Option<Self> {
        serde_json::from_str::<ChatRequest>(line)
            .ok()
            .filter(|r| !r.prompt.trim().is_empty())
    }

    /// Fill unset fields from `defaults`. `maxNew` is capped at
    /// [`MAX_NEW_TOKENS`].
    pub fn to_request(&self, defaults: &SamplingParams) -> GenerationRequest {
        GenerationRequest::with_params(
            self.prompt.clone(),
            SamplingParams {
                max_new_tokens: self.max_new.unwrap_or(defaults.max_new_tokens).min(MAX_NEW_TOKENS),
                top_p: self.top_p.unwrap_or(defaults.top_p),
                temperature: self.temperature.unwrap_or(defaults.temperature),
            },
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub mode: String,
    pub ms: u64,
}

impl ChatResponse {
    pub fn from_reply(reply: &Reply) -> Self {
        let text = if reply.is_blank() {
            NO_ANSWER_REPLY.to_string()
        } else {
            reply.text.clone()
        };
        Self {
            reply: text,
            mode: reply.mode.to_string(),
            ms: u64::try_from(reply.latency.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn degraded() -> Self {
        Self {
            reply: DEGRADED_REPLY.to_string(),
            mode: DEGRADED_MODE.to_string(),
            ms: 0,
        }
    }

    pub fn to_json(&self) -> String {
        // a struct of strings and integers always serializes
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Answer one request line. Returns the raw reply too when the request was
/// valid, so callers can record it.
pub fn handle_line<R: Rng>(
    engine: &Orchestrator,
    line: &str,
    rng: &mut R,
) -> (ChatResponse, Option<(ChatRequest, Reply)>) {
    match ChatRequest::parse(line) {
        Some(request) => {
            let reply = engine.answer(&request.to_request(engine.defaults()), rng);
            (ChatResponse::from_reply(&reply), Some((request, reply)))
        }
        None => (ChatResponse::degraded(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use reply_engine::{EngineBuilder, EngineConfig, Mode, TrainingPair};
    use std::time::Duration;

    fn engine() -> Orchestrator {
        let config = EngineConfig::default();
        let mut builder = EngineBuilder::new(&config).unwrap();
        builder.add_pair(&TrainingPair::new("ping", "pong"));
        builder.build(&config, &mut StdRng::seed_from_u64(0)).unwrap()
    }

    #[test]
    fn test_request_uses_camel_case_and_defaults() {
        let request = ChatRequest::parse(r#"{"prompt":"hi","maxNew":5,"topP":0.5}"#).unwrap();
        assert_eq!(request.max_new, Some(5));
        let generation = request.to_request(&SamplingParams::default());
        assert_eq!(generation.params.max_new_tokens, 5);
        assert_eq!(generation.params.top_p, 0.5);
        assert_eq!(generation.params.temperature, 0.8);
    }

    #[test]
    fn test_bad_requests_are_rejected() {
        assert!(ChatRequest::parse("not json").is_none());
        assert!(ChatRequest::parse(r#"{"maxNew":5}"#).is_none());
        assert!(ChatRequest::parse(r#"{"prompt":"   "}"#).is_none());
    }

    #[test]
    fn test_blank_reply_becomes_no_answer_message() {
        let reply = Reply {
            text: " ".into(),
            mode: Mode::Ngram,
            latency: Duration::from_millis(12),
        };
        let response = ChatResponse::from_reply(&reply);
        assert_eq!(response.reply, NO_ANSWER_REPLY);
        assert_eq!(response.mode, "ngram");
        assert_eq!(response.ms, 12);
    }

    #[test]
    fn test_handle_line() {
        let engine = engine();
        let mut rng = StdRng::seed_from_u64(1);

        let (response, answered) = handle_line(&engine, r#"{"prompt":"PING"}"#, &mut rng);
        assert_eq!(response.reply, "pong");
        assert_eq!(response.mode, "memory");
        assert_eq!(answered.unwrap().0.prompt, "PING");

        let (response, answered) = handle_line(&engine, "{oops", &mut rng);
        assert_eq!(response, ChatResponse::degraded());
        assert!(answered.is_none());
    }

    #[test]
    fn test_huge_max_new_is_capped() {
        let line = r#"{"prompt":"zzz","maxNew":18446744073709551615}"#;
        let request = ChatRequest::parse(line).unwrap();
        assert_eq!(request.max_new, Some(usize::MAX));
        assert_eq!(request.to_request(&SamplingParams::default()).params.max_new_tokens, MAX_NEW_TOKENS);

        let engine = engine();
        let (response, answered) = handle_line(&engine, line, &mut StdRng::seed_from_u64(2));
        assert_eq!(response.mode, "ngram");
        assert!(answered.is_some());
    }

    #[test]
    fn test_response_json_shape() {
        let json = ChatResponse::degraded().to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["mode"], "degraded");
        assert_eq!(value["ms"], 0);
        assert!(value["reply"].is_string());
    }
}
