//! Taproom console host.
//!
//! Feeds room energy into the party engine, turns Enter presses into listening
//! sessions, answers transcripts through the responder and speaker queue, and
//! lets Toni talk to a quiet room. Enter is ignored while Toni talks or thinks;
//! a reply that lands mid-session is held until listening ends. `q` or Ctrl-C
//! quits.

use std::sync::Arc;
use taproom_core::phrases::{self, GREETING, LISTENING, MIC_DENIED, NOT_UNDERSTOOD};
use taproom_core::{Activity, BanterClient, Generator, IdleCommentary, Responder, TaproomConfig};
use taproom_voice::{
    AudioConfig, AudioSink, AudioSource, ChunkedRecognizer, CpalSource, EnergyMonitor, EspeakVoice, ListenEvent,
    ListeningController, PartyEngine, RemoteSynthesizer, RemoteTranscriber, RemoteTts, RodioSink, SpeakerBackends,
    SpeakerQueue, Transcriber, Transcript, VoiceError,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[taproom-daemon] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = TaproomConfig::load()?;

    // Party level from ambient energy.
    let energy_source: Arc<dyn AudioSource> = Arc::new(CpalSource::new(AudioConfig {
        sample_rate: config.energy.sample_rate,
        ..Default::default()
    }));
    let (mut monitor, mut readings) = EnergyMonitor::new(energy_source, config.energy.clone());
    let mut party = PartyEngine::new(config.party.clone())?;

    // Listening.
    let transcriber: Option<Arc<dyn Transcriber>> = match &config.stt_api_key {
        Some(key) => Some(Arc::new(RemoteTranscriber::new(&config.recognizer, key.clone())?)),
        None => {
            warn!("no STT credential; listening is unavailable");
            None
        }
    };
    let recognizer = Arc::new(ChunkedRecognizer::new(transcriber, config.recognizer.clone()));
    let mic: Arc<dyn AudioSource> = Arc::new(CpalSource::new(AudioConfig {
        sample_rate: config.recognizer.sample_rate,
        ..Default::default()
    }));
    let (listener, mut transcripts) = ListeningController::spawn(config.listen.clone(), mic, recognizer);

    // Speaking.
    let speaker = SpeakerQueue::spawn(config.speaker.clone(), speaker_backends(&config)?);

    // Replies.
    let generator: Option<Arc<dyn Generator>> = match &config.llm_api_key {
        Some(key) => Some(Arc::new(BanterClient::new(key.clone(), config.banter.clone())?)),
        None => None,
    };
    let responder = Responder::new(generator);
    let (reply_tx, mut replies) = mpsc::unbounded_channel::<String>();
    let mut processing = false;
    let mut held_reply: Option<String> = None;

    let mut idle = IdleCommentary::new(config.idle.clone());
    let idle_timer = tokio::time::sleep(idle.next_delay());
    tokio::pin!(idle_timer);

    let mut listen_status = listener.subscribe();
    let mut speaker_state = speaker.subscribe();
    let mut gestures = BufReader::new(tokio::io::stdin()).lines();

    info!(
        remote_tts = config.tts_api_key.is_some(),
        remote_stt = config.stt_api_key.is_some(),
        banter = responder.has_generator(),
        "🍺 Taproom open. Enter = listen/stop, q = quit"
    );
    if let Err(e) = monitor.resume().await {
        warn!(error = %e, "energy monitor could not open the microphone");
        say(&speaker, MIC_DENIED);
    }
    say(&speaker, GREETING);

    loop {
        tokio::select! {
            Some(reading) = readings.recv() => {
                let before = party.level();
                party.update(reading.energy);
                if party.level() != before {
                    let mood = party.mood();
                    info!(level = party.level(), "{} {}", mood.emoji(), mood.label());
                }
            }
            line = gestures.next_line() => match line {
                Ok(Some(line)) if line.trim().eq_ignore_ascii_case("q") => break,
                Ok(Some(_)) => {
                    let activity = Activity {
                        listening: listener.is_listening(),
                        speaking: speaker.is_speaking(),
                        processing,
                    };
                    if !activity.accepts_gesture() {
                        tracing::debug!(status = phrases::status_line(activity.listening, activity.processing, activity.speaking), "gesture ignored");
                    } else if activity.listening {
                        listener.stop_listening();
                    } else {
                        monitor.pause();
                        idle.touch();
                        match listener.start_listening(config.listen.max_duration()).await {
                            Ok(()) => info!("🎤 {}", LISTENING),
                            Err(e @ VoiceError::AudioDevice(_)) | Err(e @ VoiceError::AudioStream(_)) => {
                                warn!(error = %e, "microphone unavailable");
                                say(&speaker, MIC_DENIED);
                            }
                            Err(e) => warn!(error = %e, "could not start listening"),
                        }
                        sync_monitor(&mut monitor, listener.is_listening(), speaker.is_speaking()).await;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "stdin closed");
                    break;
                }
            },
            Some(event) = transcripts.recv() => match event {
                ListenEvent::Partial(text) => info!("🎤 {}", text),
                ListenEvent::Final(Transcript::Empty) => say(&speaker, NOT_UNDERSTOOD),
                ListenEvent::Final(Transcript::Text(text)) => {
                    info!("📝 Gast: {}", text);
                    processing = true;
                    idle.touch();
                    let responder = responder.clone();
                    let reply_tx = reply_tx.clone();
                    let level = party.level();
                    tokio::spawn(async move {
                        let reply = responder.respond(&text, level).await;
                        let _ = reply_tx.send(reply);
                    });
                }
            },
            Some(reply) = replies.recv() => {
                processing = false;
                idle.touch();
                let activity = Activity { listening: listener.is_listening(), ..Default::default() };
                if activity.holds_reply() {
                    tracing::debug!("reply held until listening ends");
                    held_reply = Some(reply);
                } else {
                    say(&speaker, &reply);
                }
            }
            Ok(()) = listen_status.changed() => {
                let listening = listen_status.borrow_and_update().is_listening();
                if !listening {
                    if let Some(reply) = held_reply.take() {
                        say(&speaker, &reply);
                    }
                }
                sync_monitor(&mut monitor, listening, speaker.is_speaking()).await;
            }
            Ok(()) = speaker_state.changed() => {
                let speaking = speaker_state.borrow_and_update().is_speaking;
                sync_monitor(&mut monitor, listener.is_listening(), speaking).await;
            }
            () = &mut idle_timer => {
                let activity = Activity {
                    listening: listener.is_listening(),
                    speaking: speaker.is_speaking(),
                    processing,
                };
                if idle.is_due(std::time::Instant::now(), activity) {
                    say(&speaker, &idle.comment(party.level()));
                    idle.touch();
                } else {
                    tracing::debug!(status = phrases::status_line(activity.listening, activity.processing, activity.speaking), "idle comment skipped");
                }
                idle_timer.as_mut().reset(tokio::time::Instant::now() + idle.next_delay());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("CTRL-C received; closing the taproom");
                break;
            }
        }
    }

    listener.stop_listening();
    speaker.stop();
    monitor.pause();
    info!("👋 {}", phrases::FAREWELL);
    Ok(())
}

fn say(speaker: &SpeakerQueue, text: &str) {
    info!("🍺 Toni: {}", text);
    speaker.speak(text);
}

/// The microphone belongs to the listener while it listens, and the room is
/// not measured while Toni talks.
async fn sync_monitor(monitor: &mut EnergyMonitor, listening: bool, speaking: bool) {
    if listening || speaking {
        monitor.pause();
    } else if let Err(e) = monitor.resume().await {
        warn!(error = %e, "energy monitor could not resume");
    }
}

fn speaker_backends(config: &TaproomConfig) -> Result<SpeakerBackends, VoiceError> {
    let speaker = &config.speaker;
    let remote: Option<Arc<dyn RemoteSynthesizer>> = match &config.tts_api_key {
        Some(key) => Some(Arc::new(RemoteTts::new(
            speaker.remote_base_url.clone(),
            key.clone(),
            speaker.remote_model.clone(),
            speaker.remote_voice.clone(),
            speaker.remote_format.clone(),
            speaker.remote_timeout(),
        )?)),
        None => None,
    };
    let sink: Option<Arc<dyn AudioSink>> = if remote.is_some() {
        match RodioSink::new() {
            Ok(sink) => Some(Arc::new(sink)),
            Err(e) => {
                warn!(error = %e, "no audio output; remote synthesis disabled");
                None
            }
        }
    } else {
        None
    };
    let local = Arc::new(EspeakVoice::new(
        speaker.espeak_binary.clone(),
        speaker.local_rate,
        speaker.local_pitch,
    ));
    Ok(SpeakerBackends { remote, sink, local })
}
