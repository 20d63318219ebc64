//! Example: one listening session, echoed back through the speaker queue.
//!
//! Needs a microphone, `espeak-ng`, and `STT_API_KEY` for transcription.
//! `TTS_API_KEY` additionally enables remote synthesis.

use std::sync::Arc;
use taproom_voice::{
    AudioConfig, ChunkedRecognizer, CpalSource, EspeakVoice, ListenConfig, ListenEvent, ListeningController,
    RecognizerConfig, RemoteSynthesizer, RemoteTranscriber, RemoteTts, RodioSink, SpeakerBackends, SpeakerConfig,
    SpeakerQueue, Transcriber,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🎤 Taproom listen demo");

    let rec_config = RecognizerConfig::default();
    let transcriber: Option<Arc<dyn Transcriber>> = match std::env::var("STT_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Some(Arc::new(RemoteTranscriber::new(&rec_config, key)?)),
        _ => {
            warn!("STT_API_KEY not set; the recognizer will report itself unavailable");
            None
        }
    };
    let recognizer = Arc::new(ChunkedRecognizer::new(transcriber, rec_config));
    let source = Arc::new(CpalSource::new(AudioConfig::default()));
    let listen_config = ListenConfig::default();
    let max_duration = listen_config.max_duration();
    let (listener, mut events) = ListeningController::spawn(listen_config, source, recognizer);

    let speaker_config = SpeakerConfig::default();
    let remote: Option<Arc<dyn RemoteSynthesizer>> = match std::env::var("TTS_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Some(Arc::new(RemoteTts::new(
            speaker_config.remote_base_url.clone(),
            key,
            speaker_config.remote_model.clone(),
            speaker_config.remote_voice.clone(),
            speaker_config.remote_format.clone(),
            speaker_config.remote_timeout(),
        )?)),
        _ => None,
    };
    let sink = match RodioSink::new() {
        Ok(sink) => Some(Arc::new(sink) as Arc<dyn taproom_voice::AudioSink>),
        Err(e) => {
            warn!(error = %e, "no audio output; remote synthesis disabled");
            None
        }
    };
    let local = Arc::new(EspeakVoice::new(
        speaker_config.espeak_binary.clone(),
        speaker_config.local_rate,
        speaker_config.local_pitch,
    ));
    let speaker = SpeakerQueue::spawn(speaker_config, SpeakerBackends { remote, sink, local });

    listener.start_listening(max_duration).await?;
    info!("✅ Speak now...");

    while let Some(event) = events.recv().await {
        match event {
            ListenEvent::Partial(text) => info!("… {}", text),
            ListenEvent::Final(transcript) => {
                match transcript.text() {
                    Some(text) => {
                        info!("📝 {}", text);
                        speaker.speak(format!("Du hast gesagt: {}", text));
                    }
                    None => speaker.speak("Ich hab nix verstanden."),
                }
                break;
            }
        }
    }

    speaker.wait_idle().await;
    info!("👋 Done");
    Ok(())
}
