//! End-to-end streaming sessions over an in-memory transport with mock engines.

use async_trait::async_trait;
use livescribe::admission::AdmissionController;
use livescribe::audio::{AudioWindow, OverlapPolicy};
use livescribe::auth::{StreamAuth, issue_token, unix_now};
use livescribe::diarize::{Diarizer, DisabledDiarizer, MockDiarizer, SpeakerTurn};
use livescribe::engine::Engines;
use livescribe::error::{CLOSE_NORMAL, CLOSE_RATE_LIMITED, CLOSE_UNAUTHORIZED};
use livescribe::session::{
    Frame, Handshake, ServerMessage, SessionContext, SessionOutcome, StreamSettings, Transport,
    run_session,
};
use livescribe::stt::{MockTranscriber, Transcriber, Transcript, TranscriptionRequest, Word};
use livescribe::text::Normalizer;
use livescribe::Result;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CHUNK_MS: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Message(ServerMessage),
    Closed(u16),
}

/// Client side of a session: frames in, events out.
struct ChannelTransport {
    incoming: mpsc::UnboundedReceiver<Frame>,
    outgoing: mpsc::UnboundedSender<Event>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn recv(&mut self) -> Option<Result<Frame>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn send(&mut self, message: &ServerMessage) -> Result<()> {
        // The client may have hung up; the session must not care
        let _ = self.outgoing.send(Event::Message(message.clone()));
        Ok(())
    }

    async fn close(&mut self, code: u16, _reason: &str) -> Result<()> {
        let _ = self.outgoing.send(Event::Closed(code));
        Ok(())
    }
}

struct Client {
    frames: mpsc::UnboundedSender<Frame>,
    events: mpsc::UnboundedReceiver<Event>,
    task: JoinHandle<SessionOutcome>,
}

impl Client {
    // Sends fail once the server has ended the session; that is fine here
    fn send_audio(&self, bytes: Vec<u8>) {
        let _ = self.frames.send(Frame::Binary(bytes));
    }

    fn send_text(&self, text: &str) {
        let _ = self.frames.send(Frame::Text(text.to_string()));
    }

    fn stream(&self, pcm: &[u8]) {
        let chunk = (16000 * CHUNK_MS / 1000 * 2) as usize;
        for piece in pcm.chunks(chunk) {
            self.send_audio(piece.to_vec());
        }
    }

    async fn next_event(&mut self) -> Event {
        self.events.recv().await.unwrap()
    }

    /// Finish the session and collect everything the server sent.
    async fn finish(self, stop: bool) -> (SessionOutcome, Vec<Event>) {
        let Client {
            frames,
            mut events,
            task,
        } = self;
        if stop {
            let _ = frames.send(Frame::Text("STOP".into()));
        }
        drop(frames);
        let outcome = task.await.unwrap();
        let mut collected = Vec::new();
        while let Ok(event) = events.try_recv() {
            collected.push(event);
        }
        (outcome, collected)
    }
}

fn address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))
}

fn connect(ctx: &Arc<SessionContext>, token: Option<String>) -> Client {
    let (frames, incoming) = mpsc::unbounded_channel();
    let (outgoing, events) = mpsc::unbounded_channel();
    let ctx = Arc::clone(ctx);
    let task = tokio::spawn(async move {
        let mut transport = ChannelTransport { incoming, outgoing };
        let handshake = Handshake {
            address: address(),
            token,
        };
        run_session(&mut transport, &ctx, handshake).await
    });
    Client {
        frames,
        events,
        task,
    }
}

fn context(
    transcriber: Arc<dyn Transcriber>,
    diarizer: Arc<dyn Diarizer>,
    auth: StreamAuth,
    cap: usize,
) -> Arc<SessionContext> {
    Arc::new(SessionContext {
        engines: Engines::new(transcriber, diarizer, Normalizer::new("pl", &[]).unwrap()),
        admission: Arc::new(AdmissionController::new(cap)),
        auth,
        settings: StreamSettings::default(),
    })
}

fn silence(secs: f32) -> Vec<u8> {
    vec![0; (secs * 16000.0) as usize * 2]
}

fn tone(secs: f32) -> Vec<u8> {
    (0..(secs * 16000.0) as usize)
        .flat_map(|i| {
            let phase = (i % 40) as f32 / 40.0 * std::f32::consts::TAU;
            ((phase.sin() * 6000.0) as i16).to_le_bytes()
        })
        .collect()
}

fn partials(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Message(ServerMessage::Partial { text, .. }) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn final_message(events: &[Event]) -> Option<(String, Option<String>)> {
    events.iter().find_map(|e| match e {
        Event::Message(ServerMessage::Final {
            text,
            diarized_text,
            ..
        }) => Some((text.clone(), diarized_text.clone())),
        _ => None,
    })
}

fn error_codes(events: &[Event]) -> Vec<Option<u16>> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Message(ServerMessage::Error { code, .. }) => Some(*code),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn silence_produces_no_partials_and_empty_final() {
    let transcriber = Arc::new(MockTranscriber::new("mock").with_response("cisza"));
    let ctx = context(
        transcriber.clone(),
        Arc::new(DisabledDiarizer),
        StreamAuth::disabled(),
        3,
    );
    let client = connect(&ctx, None);
    client.stream(&silence(20.0));

    let (outcome, events) = client.finish(true).await;

    assert_eq!(outcome, SessionOutcome::Finalized);
    assert!(partials(&events).is_empty(), "{events:?}");
    assert_eq!(final_message(&events), Some((String::new(), None)));
    assert_eq!(events.last(), Some(&Event::Closed(CLOSE_NORMAL)));
    assert_eq!(transcriber.calls(), 0);
}

#[tokio::test]
async fn hallucinated_window_contributes_nothing() {
    let transcriber =
        Arc::new(MockTranscriber::new("mock").with_responses(&["Subskrybuj.", "dzień dobry"]));
    let ctx = context(
        transcriber.clone(),
        Arc::new(DisabledDiarizer),
        StreamAuth::disabled(),
        3,
    );
    let client = connect(&ctx, None);
    // 12 s triggers the first window, 10 s more (plus 2 s overlap) the second
    client.stream(&tone(22.0));

    let (outcome, events) = client.finish(true).await;

    assert_eq!(outcome, SessionOutcome::Finalized);
    assert_eq!(partials(&events), vec!["Dzień dobry."]);
    let (text, diarized) = final_message(&events).unwrap();
    assert!(text.starts_with("Dzień dobry."), "{text}");
    assert!(!text.to_lowercase().contains("subskrybuj"), "{text}");
    assert_eq!(diarized, None);
    assert_eq!(transcriber.calls(), 3);
}

#[tokio::test]
async fn partials_are_emitted_per_window() {
    let ctx = context(
        Arc::new(MockTranscriber::new("mock").with_responses(&["pierwsze zdanie", "drugie zdanie"])),
        Arc::new(DisabledDiarizer),
        StreamAuth::disabled(),
        3,
    );
    let mut client = connect(&ctx, None);
    client.stream(&tone(12.0));
    assert_eq!(
        client.next_event().await,
        Event::Message(ServerMessage::partial("Pierwsze zdanie."))
    );

    let (_, events) = client.finish(true).await;
    let (text, _) = final_message(&events).unwrap();
    assert_eq!(text, "Pierwsze zdanie. Drugie zdanie.");
}

#[tokio::test]
async fn diarize_mode_labels_speakers_in_final() {
    let transcriber = MockTranscriber::new("mock")
        .with_response("dzień dobry witam")
        .with_words(vec![
            Word::new(0.0, 0.4, "dzień"),
            Word::new(0.5, 0.9, "dobry"),
            Word::new(1.6, 2.2, "witam"),
        ]);
    let diarizer = MockDiarizer::new().with_turns(vec![
        SpeakerTurn::new(0.0, 1.2, "SPEAKER_07"),
        SpeakerTurn::new(1.2, 3.0, "SPEAKER_02"),
    ]);
    let ctx = context(
        Arc::new(transcriber),
        Arc::new(diarizer),
        StreamAuth::disabled(),
        3,
    );
    let mut client = connect(&ctx, None);
    client.send_text(r#"{"mode":"diarize"}"#);
    assert_eq!(
        client.next_event().await,
        Event::Message(ServerMessage::ModeAck {
            status: "diarize_enabled".into()
        })
    );
    client.stream(&tone(3.0));

    let (outcome, events) = client.finish(true).await;

    assert_eq!(outcome, SessionOutcome::Finalized);
    let (text, diarized) = final_message(&events).unwrap();
    assert_eq!(text, "Dzień dobry witam.");
    assert_eq!(
        diarized.as_deref(),
        Some("[Mówca 1] Dzień dobry.\n\n[Mówca 2] Witam.")
    );
}

#[tokio::test]
async fn diarize_mode_without_engine_falls_back_to_plain() {
    let ctx = context(
        Arc::new(MockTranscriber::new("mock").with_response("tekst")),
        Arc::new(DisabledDiarizer),
        StreamAuth::disabled(),
        3,
    );
    let client = connect(&ctx, None);
    client.send_text(r#"{"mode":"diarize"}"#);
    client.stream(&tone(2.0));

    let (_, events) = client.finish(true).await;
    assert_eq!(final_message(&events), Some(("Tekst.".into(), None)));
}

#[tokio::test]
async fn missing_token_is_rejected_before_streaming() {
    let transcriber = Arc::new(MockTranscriber::new("mock"));
    let ctx = context(
        transcriber.clone(),
        Arc::new(DisabledDiarizer),
        StreamAuth::new(None, Some("secret"), 60),
        3,
    );
    let client = connect(&ctx, None);
    client.stream(&tone(13.0));

    let (outcome, events) = client.finish(true).await;

    assert_eq!(outcome, SessionOutcome::Rejected(CLOSE_UNAUTHORIZED));
    assert_eq!(error_codes(&events), vec![Some(CLOSE_UNAUTHORIZED)]);
    assert_eq!(events.last(), Some(&Event::Closed(CLOSE_UNAUTHORIZED)));
    assert!(final_message(&events).is_none());
    assert_eq!(transcriber.calls(), 0);
    assert_eq!(ctx.admission.active(address()), 0);
}

#[tokio::test]
async fn signed_token_is_accepted() {
    let ctx = context(
        Arc::new(MockTranscriber::new("mock")),
        Arc::new(DisabledDiarizer),
        StreamAuth::new(None, Some("secret"), 60),
        3,
    );
    let token = issue_token("secret", "anna@example.com", unix_now()).unwrap();
    let client = connect(&ctx, Some(token));

    let (outcome, _) = client.finish(true).await;
    assert_eq!(outcome, SessionOutcome::Finalized);
}

#[tokio::test]
async fn sessions_over_cap_are_rate_limited_until_one_ends() {
    let ctx = context(
        Arc::new(MockTranscriber::new("mock")),
        Arc::new(DisabledDiarizer),
        StreamAuth::disabled(),
        1,
    );

    let mut first = connect(&ctx, None);
    first.send_text(r#"{"mode":"plain"}"#);
    // Acknowledged means the first session holds its slot
    first.next_event().await;
    assert_eq!(ctx.admission.active(address()), 1);

    let second = connect(&ctx, None);
    let (outcome, events) = second.finish(false).await;
    assert_eq!(outcome, SessionOutcome::Rejected(CLOSE_RATE_LIMITED));
    assert_eq!(error_codes(&events), vec![Some(CLOSE_RATE_LIMITED)]);
    assert_eq!(events.last(), Some(&Event::Closed(CLOSE_RATE_LIMITED)));
    assert_eq!(ctx.admission.active(address()), 1);

    let (outcome, _) = first.finish(false).await;
    assert_eq!(outcome, SessionOutcome::Disconnected);
    assert_eq!(ctx.admission.active(address()), 0);

    let third = connect(&ctx, None);
    let (outcome, _) = third.finish(true).await;
    assert_eq!(outcome, SessionOutcome::Finalized);
}

#[tokio::test]
async fn disconnect_sends_no_final_and_releases_slot() {
    let ctx = context(
        Arc::new(MockTranscriber::new("mock")),
        Arc::new(DisabledDiarizer),
        StreamAuth::disabled(),
        3,
    );
    let client = connect(&ctx, None);
    client.send_text(r#"{"mode":"diarize"}"#);
    client.stream(&tone(5.0));

    let (outcome, events) = client.finish(false).await;

    assert_eq!(outcome, SessionOutcome::Disconnected);
    assert!(final_message(&events).is_none());
    assert!(!events.iter().any(|e| matches!(e, Event::Closed(_))));
    assert_eq!(ctx.admission.active(address()), 0);
    assert_eq!(ctx.admission.tracked_addresses(), 0);
}

#[tokio::test]
async fn engine_error_is_reported_and_session_continues() {
    let ctx = context(
        Arc::new(MockTranscriber::new("mock").with_failure()),
        Arc::new(DisabledDiarizer),
        StreamAuth::disabled(),
        3,
    );
    let mut client = connect(&ctx, None);
    client.stream(&tone(12.0));
    assert!(matches!(
        client.next_event().await,
        Event::Message(ServerMessage::Error {
            code: Some(500),
            ..
        })
    ));

    // Still accepting control messages after the failure
    client.send_text(r#"{"mode":"diarize"}"#);
    assert_eq!(
        client.next_event().await,
        Event::Message(ServerMessage::mode_ack(livescribe::session::Mode::Diarize))
    );

    let (outcome, events) = client.finish(true).await;
    assert_eq!(outcome, SessionOutcome::Finalized);
    assert_eq!(final_message(&events).map(|(text, _)| text), Some(String::new()));
}

#[tokio::test]
async fn unknown_control_message_is_not_fatal() {
    let ctx = context(
        Arc::new(MockTranscriber::new("mock").with_response("dalej")),
        Arc::new(DisabledDiarizer),
        StreamAuth::disabled(),
        3,
    );
    let client = connect(&ctx, None);
    client.send_text("hello?");
    client.stream(&tone(2.0));

    let (outcome, events) = client.finish(true).await;
    assert_eq!(outcome, SessionOutcome::Finalized);
    assert_eq!(error_codes(&events), vec![Some(400)]);
    assert_eq!(final_message(&events), Some(("Dalej.".into(), None)));
}

/// Engine that takes longer than the configured timeout and records overlap.
#[derive(Default)]
struct SlowTranscriber {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Transcriber for SlowTranscriber {
    fn transcribe(&self, _w: &AudioWindow, _r: &TranscriptionRequest) -> Result<Transcript> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(150));
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(Transcript::from_text("wolno"))
    }

    fn model_name(&self) -> &str {
        "slow"
    }

    fn is_ready(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn slow_engine_keeps_one_window_in_flight() {
    let slow = Arc::new(SlowTranscriber::default());
    let engines = Engines::new(
        slow.clone(),
        Arc::new(DisabledDiarizer),
        Normalizer::new("pl", &[]).unwrap(),
    )
    .with_max_concurrency(4)
    .with_timeout(Duration::from_millis(50));
    let ctx = Arc::new(SessionContext {
        engines,
        admission: Arc::new(AdmissionController::new(3)),
        auth: StreamAuth::disabled(),
        settings: StreamSettings {
            buffer_secs: 1.0,
            overlap: OverlapPolicy::Discard,
            ..StreamSettings::default()
        },
    });

    let client = connect(&ctx, None);
    for _ in 0..4 {
        client.send_audio(tone(1.0));
    }

    let (outcome, events) = client.finish(true).await;
    assert_eq!(outcome, SessionOutcome::Finalized);
    assert_eq!(slow.peak.load(Ordering::SeqCst), 1);
    assert!(error_codes(&events).is_empty(), "{events:?}");
    assert_eq!(partials(&events), vec!["Wolno."; 4]);
    assert_eq!(slow.active.load(Ordering::SeqCst), 0);
}
