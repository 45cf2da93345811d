//! Composition root: turns a [`Config`] into engines, session context and router.

use crate::admission::AdmissionController;
use crate::config::{Config, SttEngine};
use crate::diarize::{Diarizer, DisabledDiarizer};
use crate::engine::Engines;
use crate::error::{LivescribeError, Result};
use crate::server::{self, AppState, RouterOptions};
use crate::session::SessionContext;
use crate::stt::Transcriber;
use crate::text::Normalizer;
use std::sync::Arc;

/// Load the configured transcription engine.
///
/// Model loading is slow and blocking; call this once at startup.
pub fn create_transcriber(config: &Config) -> Result<Arc<dyn Transcriber>> {
    match config.stt.engine {
        SttEngine::Whisper => {
            use crate::stt::whisper::{WhisperConfig, WhisperTranscriber};
            let transcriber = WhisperTranscriber::new(WhisperConfig {
                model_path: config.stt.model_path.clone(),
                threads: config.stt.threads,
                use_gpu: config.stt.use_gpu,
            })?;
            Ok(Arc::new(transcriber))
        }
        #[cfg(feature = "remote-engines")]
        SttEngine::Remote => {
            use crate::stt::remote::{HttpTranscriber, RemoteSttConfig};
            let transcriber = HttpTranscriber::new(RemoteSttConfig {
                endpoint: config.stt.endpoint.clone().unwrap_or_default(),
                model: config.stt.remote_model.clone(),
                api_key: config.stt.api_key.clone().filter(|k| !k.is_empty()),
                timeout: config.engine_timeout(),
            })?;
            Ok(Arc::new(transcriber))
        }
        #[cfg(not(feature = "remote-engines"))]
        SttEngine::Remote => Err(LivescribeError::ConfigInvalidValue {
            key: "stt.engine".to_string(),
            message: "remote engine support not compiled in (enable feature remote-engines)"
                .to_string(),
        }),
    }
}

/// Diarization engine, or the disabled one when not configured.
pub fn create_diarizer(config: &Config) -> Result<Arc<dyn Diarizer>> {
    let Some(endpoint) = config.diarization_endpoint() else {
        if config.diarization.enabled {
            tracing::warn!("Diarization enabled without an endpoint; speaker labels disabled");
        }
        return Ok(Arc::new(DisabledDiarizer));
    };

    #[cfg(feature = "remote-engines")]
    {
        let diarizer =
            crate::diarize::remote::HttpDiarizer::new(endpoint, config.engine_timeout())?;
        Ok(Arc::new(diarizer))
    }
    #[cfg(not(feature = "remote-engines"))]
    {
        Err(LivescribeError::ConfigInvalidValue {
            key: "diarization.endpoint".to_string(),
            message: format!(
                "cannot use {endpoint}: remote engine support not compiled in"
            ),
        })
    }
}

/// Wrap loaded engines with the gate and text pipeline the config asks for.
pub fn build_engines(
    config: &Config,
    transcriber: Arc<dyn Transcriber>,
    diarizer: Arc<dyn Diarizer>,
) -> Result<Engines> {
    let normalizer = Normalizer::new(&config.stt.language, &config.text.extra_hallucinations)?;
    Ok(Engines::new(transcriber, diarizer, normalizer)
        .with_max_concurrency(config.engine.max_concurrent_inferences)
        .with_timeout(config.engine_timeout())
        .with_language(&config.stt.language)
        .with_prompt(config.prompt_policy()))
}

/// Application state for already-built engines.
pub fn build_state(config: &Config, engines: Engines) -> AppState {
    let session = SessionContext {
        engines,
        admission: Arc::new(AdmissionController::new(
            config.stream.max_sessions_per_address,
        )),
        auth: config.stream_auth(),
        settings: config.stream_settings(),
    };
    AppState::new(session, config.batch_auth()).with_trust_forwarded_for(config.server.trust_forwarded_for)
}

pub fn router_options(config: &Config) -> RouterOptions {
    RouterOptions {
        cors_origins: config.server.cors_origins.clone(),
        max_batch_body_bytes: config.server.max_batch_body_bytes,
    }
}

/// Validate the config, load engines and serve until shutdown.
pub async fn run_server(config: Config) -> Result<()> {
    config.validate()?;
    tracing::info!(version = %crate::version_string(), "Starting livescribe");

    let loader = config.clone();
    let (transcriber, diarizer) = tokio::task::spawn_blocking(move || {
        Ok::<_, LivescribeError>((create_transcriber(&loader)?, create_diarizer(&loader)?))
    })
    .await
    .map_err(|e| LivescribeError::Other(format!("Engine loading panicked: {e}")))??;

    if !transcriber.is_ready() {
        tracing::warn!(
            model = transcriber.model_name(),
            "Transcription engine is not ready; every window will fail"
        );
    }

    let engines = build_engines(&config, transcriber, diarizer)?;
    let state = build_state(&config, engines);

    let auth = &state.session.auth;
    tracing::info!(
        model = state.session.engines.model_name(),
        diarization = state.session.engines.diarization_available(),
        stream_auth = auth.is_enabled(),
        batch_auth = state.batch_auth.is_enabled(),
        cap = config.stream.max_sessions_per_address,
        "Engines ready"
    );
    if !auth.is_enabled() {
        tracing::warn!("Stream authentication disabled: no stream_token or token_secret configured");
    }

    let router = server::build_router(state, &router_options(&config));
    server::serve(router, &config.bind_address()).await
}
