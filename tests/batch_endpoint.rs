//! Batch and health endpoints driven through the router.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use livescribe::admission::AdmissionController;
use livescribe::audio::AudioWindow;
use livescribe::audio::wav::encode_wav;
use livescribe::auth::{ApiKeyAuth, StreamAuth};
use livescribe::diarize::{Diarizer, DisabledDiarizer, MockDiarizer, SpeakerTurn};
use livescribe::engine::Engines;
use livescribe::server::{AppState, RouterOptions, build_router};
use livescribe::session::{SessionContext, StreamSettings};
use livescribe::stt::{MockTranscriber, Transcriber, Word};
use livescribe::text::Normalizer;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const API_KEY: &str = "batch-key";

fn router(transcriber: Arc<dyn Transcriber>, diarizer: Arc<dyn Diarizer>) -> Router {
    let session = SessionContext {
        engines: Engines::new(transcriber, diarizer, Normalizer::new("pl", &[]).unwrap()),
        admission: Arc::new(AdmissionController::new(3)),
        auth: StreamAuth::disabled(),
        settings: StreamSettings::default(),
    };
    let state = AppState::new(session, ApiKeyAuth::new(Some(API_KEY)));
    build_router(state, &RouterOptions::default())
}

fn conversation() -> (MockTranscriber, MockDiarizer) {
    let transcriber = MockTranscriber::new("mock")
        .with_response("dzień dobry dzień dobry jak się pan czuje dobrze")
        .with_words(vec![
            Word::new(0.0, 0.4, "dzień"),
            Word::new(0.5, 0.9, "dobry"),
            Word::new(1.1, 1.4, "dzień"),
            Word::new(1.5, 1.9, "dobry"),
            Word::new(2.0, 2.2, "jak"),
            Word::new(2.3, 2.4, "się"),
            Word::new(2.5, 2.7, "pan"),
            Word::new(2.8, 3.2, "czuje"),
            Word::new(3.4, 3.9, "dobrze"),
        ]);
    let diarizer = MockDiarizer::new().with_turns(vec![
        SpeakerTurn::new(0.0, 1.0, "spk_a"),
        SpeakerTurn::new(1.0, 2.0, "spk_b"),
        SpeakerTurn::new(2.0, 3.3, "spk_a"),
        SpeakerTurn::new(3.3, 4.0, "spk_b"),
    ]);
    (transcriber, diarizer)
}

fn wav_base64(secs: f32) -> String {
    let samples: Vec<f32> = (0..(secs * 16000.0) as usize)
        .map(|i| ((i % 32) as f32 / 32.0 * std::f32::consts::TAU).sin() * 0.3)
        .collect();
    let wav = encode_wav(&AudioWindow::new(samples, 16000)).unwrap();
    STANDARD.encode(wav)
}

fn transcribe_request(body: Value, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/transcribe")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn two_speakers_are_labeled_and_counted() {
    let (transcriber, diarizer) = conversation();
    let app = router(Arc::new(transcriber), Arc::new(diarizer));

    let response = app
        .oneshot(transcribe_request(
            json!({ "audio_base64": wav_base64(4.0) }),
            Some(API_KEY),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["speaker_count"], 2);
    assert_eq!(body["text"], "Dzień dobry dzień dobry jak się pan czuje dobrze.");
    let diarized = body["diarized_text"].as_str().unwrap();
    assert!(diarized.contains("[Mówca 1]"), "{diarized}");
    assert!(diarized.contains("[Mówca 2]"), "{diarized}");
    assert_eq!(
        diarized,
        "[Mówca 1] Dzień dobry.\n\n[Mówca 2] Dzień dobry.\n\n\
         [Mówca 1] Jak się pan czuje.\n\n[Mówca 2] Dobrze."
    );
}

#[tokio::test]
async fn bearer_credential_is_accepted() {
    let app = router(
        Arc::new(MockTranscriber::new("mock").with_response("test")),
        Arc::new(DisabledDiarizer),
    );
    let request = Request::builder()
        .method("POST")
        .uri("/transcribe")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {API_KEY}"))
        .body(Body::from(json!({ "audio_base64": wav_base64(1.0) }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn without_diarizer_speaker_fields_are_null() {
    let app = router(
        Arc::new(MockTranscriber::new("mock").with_response("jeden mówca")),
        Arc::new(DisabledDiarizer),
    );

    let response = app
        .oneshot(transcribe_request(
            json!({ "audio_base64": wav_base64(2.0), "language": "pl" }),
            Some(API_KEY),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "text": "Jeden mówca.", "diarized_text": null, "speaker_count": null })
    );
}

#[tokio::test]
async fn raw_pcm_payload_is_accepted() {
    let app = router(
        Arc::new(MockTranscriber::new("mock").with_response("surowe")),
        Arc::new(DisabledDiarizer),
    );
    let pcm: Vec<u8> = (0..16000i16).flat_map(|i| (i % 200 * 50).to_le_bytes()).collect();

    let response = app
        .oneshot(transcribe_request(
            json!({ "audio_base64": STANDARD.encode(pcm) }),
            Some(API_KEY),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["text"], "Surowe.");
}

#[tokio::test]
async fn missing_or_wrong_key_is_unauthorized() {
    let transcriber = Arc::new(MockTranscriber::new("mock"));
    for key in [None, Some("wrong")] {
        let app = router(transcriber.clone(), Arc::new(DisabledDiarizer));
        let response = app
            .oneshot(transcribe_request(
                json!({ "audio_base64": wav_base64(1.0) }),
                key,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(json_body(response).await["error"].is_string());
    }
    assert_eq!(transcriber.calls(), 0);
}

#[tokio::test]
async fn undecodable_payloads_are_bad_requests() {
    let bodies = [
        json!({ "audio_base64": "%%% not base64 %%%" }),
        json!({ "audio_base64": STANDARD.encode(b"OggS\0\0\0\0rest of an ogg page") }),
        json!({ "audio_base64": STANDARD.encode([1u8, 2, 3]) }),
        json!({ "audio_base64": "" }),
        json!({ "audio": "wrong field" }),
    ];
    for body in bodies {
        let app = router(Arc::new(MockTranscriber::new("mock")), Arc::new(DisabledDiarizer));
        let response = app
            .oneshot(transcribe_request(body.clone(), Some(API_KEY)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        assert!(json_body(response).await["error"].is_string());
    }
}

#[tokio::test]
async fn engine_failure_is_internal_error() {
    let app = router(
        Arc::new(MockTranscriber::new("mock").with_failure()),
        Arc::new(DisabledDiarizer),
    );
    let response = app
        .oneshot(transcribe_request(
            json!({ "audio_base64": wav_base64(1.0) }),
            Some(API_KEY),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn health_reports_engines() {
    let app = router(
        Arc::new(MockTranscriber::new("ggml-small")),
        Arc::new(MockDiarizer::new()),
    );
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "status": "ok", "model": "ggml-small", "diarization": true })
    );
}

#[tokio::test]
async fn cors_allows_local_dev_origin_only() {
    for (origin, allowed) in [
        ("http://localhost:5173", true),
        ("https://evil.example", false),
    ] {
        let app = router(Arc::new(MockTranscriber::new("mock")), Arc::new(DisabledDiarizer));
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/transcribe")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let header = response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .map(|v| v.to_str().unwrap().to_string());
        assert_eq!(header.as_deref() == Some(origin), allowed, "{origin}");
    }
}
