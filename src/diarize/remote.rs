//! HTTP diarization sidecar client.
//!
//! Uploads the window as WAV to `POST {endpoint}/diarize` and expects
//! `{"turns": [{"start": f32, "end": f32, "speaker": str}]}` back.

use crate::audio::AudioWindow;
use crate::audio::wav::encode_wav;
use crate::diarize::{Diarizer, SpeakerTurn};
use crate::error::{LivescribeError, Result};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct TurnsResponse {
    #[serde(default)]
    turns: Vec<SpeakerTurn>,
}

/// Diarizer backed by a remote HTTP service.
#[derive(Debug)]
pub struct HttpDiarizer {
    url: String,
    client: reqwest::Client,
}

impl HttpDiarizer {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let base = endpoint.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(LivescribeError::ConfigInvalidValue {
                key: "diarization.endpoint".to_string(),
                message: "remote diarization requires an endpoint URL".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LivescribeError::Other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: format!("{base}/diarize"),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send(&self, wav: Vec<u8>) -> Result<Vec<SpeakerTurn>> {
        let part = Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| LivescribeError::Diarization {
                message: format!("Failed to build multipart audio part: {e}"),
            })?;
        let response = self
            .client
            .post(&self.url)
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .map_err(|e| LivescribeError::Diarization {
                message: format!("Diarization request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LivescribeError::Diarization {
                message: format!("Diarization service returned {status}"),
            });
        }

        let parsed: TurnsResponse =
            response
                .json()
                .await
                .map_err(|e| LivescribeError::Diarization {
                    message: format!("Failed to parse diarization response: {e}"),
                })?;
        Ok(sorted(parsed.turns))
    }
}

fn sorted(mut turns: Vec<SpeakerTurn>) -> Vec<SpeakerTurn> {
    turns.retain(|t| t.end > t.start);
    turns.sort_by(|a, b| a.start.total_cmp(&b.start));
    turns
}

impl Diarizer for HttpDiarizer {
    fn diarize(&self, window: &AudioWindow) -> Result<Vec<SpeakerTurn>> {
        let wav = encode_wav(window)?;
        let handle =
            tokio::runtime::Handle::try_current().map_err(|e| LivescribeError::Diarization {
                message: format!("Remote diarization needs a tokio runtime: {e}"),
            })?;
        handle.block_on(self.send(wav))
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_diarize_url() {
        let diarizer = HttpDiarizer::new("http://sidecar:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(diarizer.url(), "http://sidecar:8000/diarize");
    }

    #[test]
    fn rejects_empty_endpoint() {
        assert!(HttpDiarizer::new("", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn response_turns_are_sorted_and_filtered() {
        let parsed: TurnsResponse = serde_json::from_str(
            r#"{"turns": [
                {"start": 2.0, "end": 3.0, "speaker": "B"},
                {"start": 0.0, "end": 2.0, "speaker": "A"},
                {"start": 4.0, "end": 4.0, "speaker": "C"}
            ]}"#,
        )
        .unwrap();
        let turns = sorted(parsed.turns);
        let speakers: Vec<&str> = turns.iter().map(|t| t.speaker.as_str()).collect();
        assert_eq!(speakers, vec!["A", "B"]);
    }

    #[test]
    fn missing_turns_field_means_none() {
        let parsed: TurnsResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.turns.is_empty());
    }
}
