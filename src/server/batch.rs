//! Single-shot transcription of a complete recording.
//!
//! `POST /transcribe` with `{"audio_base64": .., "language"?: ..}`. The
//! payload is decoded in memory, analysed once and dropped; nothing about it
//! outlives the request.

use super::{ApiError, AppState, bearer_token};
use crate::audio::wav::decode_payload;
use crate::error::LivescribeError;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub audio_base64: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct BatchResponse {
    pub text: String,
    pub diarized_text: Option<String>,
    pub speaker_count: Option<usize>,
}

/// Batch credential: bearer token or `X-API-Key`.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    bearer_token(headers).or_else(|| headers.get("x-api-key").and_then(|v| v.to_str().ok()))
}

fn decode_base64(data: &str) -> Result<Vec<u8>, LivescribeError> {
    // Browsers hand out data URLs; accept them as-is
    let data = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    STANDARD
        .decode(data.trim())
        .map_err(|e| LivescribeError::Decode {
            message: format!("audio_base64 is not valid base64: {e}"),
        })
}

pub async fn transcribe_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    state.batch_auth.verify(presented_key(&headers))?;

    let Json(request) = body.map_err(|e| LivescribeError::Decode {
        message: e.body_text(),
    })?;

    let started = Instant::now();
    let bytes = decode_base64(&request.audio_base64)?;
    drop(request.audio_base64);
    let window = decode_payload(&bytes)?;
    drop(bytes);
    let audio_secs = window.duration_secs();

    let ctx = &state.session;
    let analysis = ctx
        .engines
        .analyze(window, request.language.as_deref(), true)
        .await?;

    let response = BatchResponse {
        diarized_text: analysis.diarized_text(&ctx.settings.speaker_label),
        speaker_count: analysis.speaker_count(),
        text: analysis.text,
    };
    tracing::info!(
        audio_secs,
        elapsed_ms = started.elapsed().as_millis() as u64,
        speakers = ?response.speaker_count,
        "Batch transcription done"
    );
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn api_key_header_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("k"));
        assert_eq!(presented_key(&headers), Some("k"));
    }

    #[test]
    fn bearer_wins_over_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("k"));
        headers.insert("authorization", HeaderValue::from_static("Bearer b"));
        assert_eq!(presented_key(&headers), Some("b"));
    }

    #[test]
    fn data_url_prefix_is_stripped() {
        assert_eq!(
            decode_base64("data:audio/wav;base64,AAEC").unwrap(),
            vec![0, 1, 2]
        );
        assert_eq!(decode_base64(" AAEC\n").unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn invalid_base64_is_decode_error() {
        let err = decode_base64("@@@").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
