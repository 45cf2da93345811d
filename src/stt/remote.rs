//! HTTP transcription engine speaking the OpenAI `audio/transcriptions` API.
//!
//! Windows are encoded as in-memory WAV and uploaded as multipart form data;
//! the `verbose_json` response carries segment and word timings.

use crate::audio::AudioWindow;
use crate::audio::wav::encode_wav;
use crate::error::{LivescribeError, Result};
use crate::stt::transcriber::{Segment, Transcriber, Transcript, TranscriptionRequest, Word};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

/// Connection settings for a remote transcription service.
#[derive(Debug, Clone)]
pub struct RemoteSttConfig {
    /// Base URL, e.g. `http://127.0.0.1:9000/v1`.
    pub endpoint: String,
    /// Model identifier sent with each request.
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct VerboseResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    segments: Vec<Segment>,
    #[serde(default)]
    words: Vec<ResponseWord>,
}

#[derive(Debug, Deserialize)]
struct ResponseWord {
    start: f32,
    end: f32,
    word: String,
}

impl VerboseResponse {
    fn into_transcript(self) -> Transcript {
        let segments = if self.segments.is_empty() && !self.text.trim().is_empty() {
            vec![Segment {
                start: 0.0,
                end: 0.0,
                text: self.text,
            }]
        } else {
            self.segments
        };
        let words = self
            .words
            .into_iter()
            .filter_map(|w| {
                let token = w.word.trim();
                (!token.is_empty()).then(|| Word::new(w.start, w.end, token))
            })
            .collect();
        Transcript { segments, words }
    }
}

/// Transcriber backed by a remote HTTP service.
///
/// The trait is blocking, so calls run on the caller's worker thread and
/// drive the async client through the ambient tokio runtime handle.
#[derive(Debug)]
pub struct HttpTranscriber {
    config: RemoteSttConfig,
    url: String,
    client: reqwest::Client,
}

impl HttpTranscriber {
    pub fn new(config: RemoteSttConfig) -> Result<Self> {
        let base = config.endpoint.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(LivescribeError::ConfigInvalidValue {
                key: "stt.endpoint".to_string(),
                message: "remote engine requires an endpoint URL".to_string(),
            });
        }
        let url = format!("{}/audio/transcriptions", base);
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LivescribeError::Other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            url,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_form(&self, window: &AudioWindow, request: &TranscriptionRequest) -> Result<Form> {
        let wav_bytes = encode_wav(window)?;
        let file_part = Part::bytes(wav_bytes)
            .file_name("window.wav")
            .mime_str("audio/wav")
            .map_err(|e| LivescribeError::Transcription {
                message: format!("Failed to build multipart audio part: {e}"),
            })?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json")
            .text("temperature", "0")
            .text("timestamp_granularities[]", "segment");

        if request.word_timestamps {
            form = form.text("timestamp_granularities[]", "word");
        }
        if !request.language.is_empty() && request.language != "auto" {
            form = form.text("language", request.language.clone());
        }
        if let Some(prompt) = request.prompt.as_deref() {
            form = form.text("prompt", prompt.to_string());
        }
        Ok(form)
    }

    async fn send(&self, form: Form) -> Result<Transcript> {
        let mut http = self.client.post(&self.url).multipart(form);
        if let Some(key) = self.config.api_key.as_deref() {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(|e| LivescribeError::Transcription {
            message: format!("Remote transcription request failed: {e}"),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(LivescribeError::Transcription {
                message: format!("Remote transcription returned {status}: {body}"),
            });
        }

        let parsed: VerboseResponse =
            response
                .json()
                .await
                .map_err(|e| LivescribeError::Transcription {
                    message: format!("Failed to parse remote transcription response: {e}"),
                })?;
        Ok(parsed.into_transcript())
    }
}

impl Transcriber for HttpTranscriber {
    fn transcribe(
        &self,
        window: &AudioWindow,
        request: &TranscriptionRequest,
    ) -> Result<Transcript> {
        let form = self.build_form(window, request)?;
        let handle =
            tokio::runtime::Handle::try_current().map_err(|e| LivescribeError::Transcription {
                message: format!("Remote transcription needs a tokio runtime: {e}"),
            })?;
        handle.block_on(self.send(form))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str) -> RemoteSttConfig {
        RemoteSttConfig {
            endpoint: endpoint.to_string(),
            model: "whisper-1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn url_is_joined_without_double_slash() {
        let transcriber = HttpTranscriber::new(config("http://localhost:9000/v1/")).unwrap();
        assert_eq!(transcriber.url(), "http://localhost:9000/v1/audio/transcriptions");
        assert_eq!(transcriber.model_name(), "whisper-1");
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        let err = HttpTranscriber::new(config("  ")).unwrap_err();
        assert!(matches!(err, LivescribeError::ConfigInvalidValue { .. }));
    }

    #[test]
    fn verbose_response_parses_segments_and_words() {
        let json = r#"{
            "text": "Dzień dobry.",
            "segments": [{"id": 0, "start": 0.0, "end": 1.2, "text": " Dzień dobry."}],
            "words": [
                {"word": "Dzień", "start": 0.0, "end": 0.5},
                {"word": " dobry.", "start": 0.6, "end": 1.2},
                {"word": " ", "start": 1.2, "end": 1.2}
            ]
        }"#;
        let parsed: VerboseResponse = serde_json::from_str(json).unwrap();
        let transcript = parsed.into_transcript();
        assert_eq!(transcript.text(), "Dzień dobry.");
        assert_eq!(transcript.words.len(), 2);
        assert_eq!(transcript.words[1].token, "dobry.");
    }

    #[test]
    fn text_only_response_becomes_one_segment() {
        let parsed: VerboseResponse = serde_json::from_str(r#"{"text": "hello"}"#).unwrap();
        let transcript = parsed.into_transcript();
        assert_eq!(transcript.segments.len(), 1);
        assert_eq!(transcript.text(), "hello");
        assert!(transcript.words.is_empty());
    }

    #[test]
    fn transcribe_outside_runtime_fails_cleanly() {
        let transcriber = HttpTranscriber::new(config("http://127.0.0.1:9")).unwrap();
        let window = AudioWindow::new(vec![0.1; 1600], 16000);
        let err = transcriber
            .transcribe(&window, &TranscriptionRequest::default())
            .unwrap_err();
        assert!(matches!(err, LivescribeError::Transcription { .. }));
    }
}
