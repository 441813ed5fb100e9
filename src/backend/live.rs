//! HTTP implementation of the generation backend

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};

use super::{
    AudioPayload, GeneratedImage, GenerationApi, HistoryTurn, SPEECH_CHANNELS, SPEECH_SAMPLE_RATE,
};
use crate::config::BackendConfig;
use crate::error::{BackendError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Requests per second against the model service
const RATE_LIMIT_PER_SECOND: u32 = 2;

/// HTTP client for the model service
pub struct LiveBackend {
    http: HttpClient,
    base_url: String,
    api_key: String,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl LiveBackend {
    /// Create a backend client from a validated configuration
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let quota =
            Quota::per_second(NonZeroU32::new(RATE_LIMIT_PER_SECOND).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    async fn post<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .header("X-ApiKey", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(BackendError::from)?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let data = response.json::<T>().await.map_err(|e| {
                    BackendError::InvalidResponse(format!("Failed to parse response: {}", e))
                })?;
                Ok(data)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(BackendError::Unauthorized.into())
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                Err(BackendError::RateLimit(Duration::from_secs(retry_after)).into())
            }
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let error_msg = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Bad request".to_string());
                Err(BackendError::BadRequest(error_msg).into())
            }
            status if status.is_server_error() => {
                let error_msg = response
                    .text()
                    .await
                    .unwrap_or_else(|_| format!("Server error: {}", status));
                Err(BackendError::ServerError(error_msg).into())
            }
            _ => {
                Err(BackendError::InvalidResponse(format!("Unexpected status code: {}", status))
                    .into())
            }
        }
    }
}

#[derive(Serialize)]
struct TextRequest<'a> {
    prompt: &'a str,
    system: &'a str,
    history: &'a [HistoryTurn],
}

#[derive(Deserialize)]
struct TextResponse {
    text: String,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    description: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

#[derive(Deserialize)]
struct SpeechResponse {
    audio: String,
    sample_rate: Option<u32>,
    channels: Option<u16>,
}

#[async_trait]
impl GenerationApi for LiveBackend {
    async fn generate_text(
        &self,
        prompt: &str,
        history: &[HistoryTurn],
        system_instruction: &str,
    ) -> Result<String> {
        let response: TextResponse = self
            .post(
                "/v1/text",
                &TextRequest {
                    prompt,
                    system: system_instruction,
                    history,
                },
            )
            .await?;

        if response.text.trim().is_empty() {
            return Err(BackendError::EmptyCompletion.into());
        }
        Ok(response.text)
    }

    async fn generate_image(&self, description: &str) -> Result<GeneratedImage> {
        let response: ImageResponse = self
            .post("/v1/image", &ImageRequest { description })
            .await?;

        let data = BASE64.decode(&response.data).map_err(|e| {
            BackendError::InvalidResponse(format!("Failed to decode image payload: {}", e))
        })?;
        if data.is_empty() {
            return Err(BackendError::InvalidResponse("Empty image payload".to_string()).into());
        }

        Ok(GeneratedImage {
            mime_type: response.mime_type,
            data,
        })
    }

    async fn generate_speech(&self, text: &str, voice: &str) -> Result<AudioPayload> {
        let response: SpeechResponse = self
            .post("/v1/speech", &SpeechRequest { text, voice })
            .await?;

        let data = BASE64.decode(&response.audio).map_err(|e| {
            BackendError::InvalidResponse(format!("Failed to decode audio payload: {}", e))
        })?;
        if data.is_empty() {
            return Err(BackendError::InvalidResponse("Empty audio payload".to_string()).into());
        }

        Ok(AudioPayload {
            data,
            sample_rate: response.sample_rate.unwrap_or(SPEECH_SAMPLE_RATE),
            channels: response.channels.unwrap_or(SPEECH_CHANNELS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn backend(base_url: &str) -> LiveBackend {
        LiveBackend::new(&BackendConfig {
            api_key: "test-key".to_string(),
            base_url: base_url.to_string(),
            voice: "kore".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_text_success() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/text")
            .match_header("x-apikey", "test-key")
            .with_status(200)
            .with_body(r#"{"text": "Ah, a wonderful question."}"#)
            .create_async()
            .await;

        let backend = backend(&server.url());
        let text = backend
            .generate_text("why?", &[], "be Einstein")
            .await
            .unwrap();
        assert_eq!(text, "Ah, a wonderful question.");
    }

    #[tokio::test]
    async fn test_generate_text_empty_completion() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/text")
            .with_status(200)
            .with_body(r#"{"text": "   "}"#)
            .create_async()
            .await;

        let backend = backend(&server.url());
        let err = backend.generate_text("why?", &[], "sys").await.unwrap_err();
        match err {
            Error::Backend(BackendError::EmptyCompletion) => (),
            other => panic!("Expected EmptyCompletion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_mapping() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/text")
            .with_status(401)
            .create_async()
            .await;

        let backend = backend(&server.url());
        let err = backend.generate_text("why?", &[], "sys").await.unwrap_err();
        match err {
            Error::Backend(BackendError::Unauthorized) => (),
            other => panic!("Expected Unauthorized, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_image_decodes_base64() {
        let mut server = mockito::Server::new_async().await;
        let encoded = BASE64.encode([0xFF, 0xD8, 0xFF, 0xE0]);
        let _m = server
            .mock("POST", "/v1/image")
            .with_status(200)
            .with_body(format!(
                r#"{{"mime_type": "image/jpeg", "data": "{}"}}"#,
                encoded
            ))
            .create_async()
            .await;

        let backend = backend(&server.url());
        let image = backend.generate_image("a chalk circle").await.unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.data, vec![0xFF, 0xD8, 0xFF, 0xE0]);
    }

    #[tokio::test]
    async fn test_generate_speech_defaults_format() {
        let mut server = mockito::Server::new_async().await;
        let encoded = BASE64.encode(vec![0u8; 480]);
        let _m = server
            .mock("POST", "/v1/speech")
            .with_status(200)
            .with_body(format!(r#"{{"audio": "{}"}}"#, encoded))
            .create_async()
            .await;

        let backend = backend(&server.url());
        let audio = backend.generate_speech("Guten Tag", "kore").await.unwrap();
        assert_eq!(audio.sample_rate, SPEECH_SAMPLE_RATE);
        assert_eq!(audio.channels, SPEECH_CHANNELS);
        assert_eq!(audio.data.len(), 480);
    }
}
