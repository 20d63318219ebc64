//! Integration tests for listening sessions and the speaker queue.
//!
//! Mock sources, recognizers and voices drive the actors under a paused Tokio
//! clock. The hardware tests at the bottom need a microphone and speakers.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taproom_voice::{
    AudioChunk, AudioSink, AudioSource, CaptureHandle, ListenConfig, ListenEvent, ListenPhase, ListeningController,
    LocalVoice, RecognitionError, RecognizerEvent, RemoteSynthesizer, SpeakerBackends, SpeakerConfig,
    SpeakerQueue, SpeechBackend, SpeechRecognizer, Transcript, VoiceError, VoiceResult,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Listening mocks
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockSource {
    starts: AtomicUsize,
    stops: Arc<AtomicUsize>,
    fail: bool,
    /// How long the device takes to open.
    open_delay: Duration,
}

#[async_trait]
impl AudioSource for MockSource {
    async fn start(&self, chunk_tx: mpsc::UnboundedSender<AudioChunk>) -> VoiceResult<CaptureHandle> {
        tokio::time::sleep(self.open_delay).await;
        if self.fail {
            return Err(VoiceError::AudioDevice("no input device".to_string()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        let _ = chunk_tx.send(AudioChunk {
            samples: vec![0.1; 480],
            timestamp: std::time::Instant::now(),
        });
        let stops = Arc::clone(&self.stops);
        Ok(CaptureHandle::new(move || {
            stops.fetch_add(1, Ordering::SeqCst);
            drop(chunk_tx);
        }))
    }
}

/// Replays `(delay, event)` steps, optionally only after the microphone closes,
/// then goes quiet forever.
struct ScriptedRecognizer {
    available: bool,
    after_audio_ends: bool,
    steps: Vec<(u64, RecognizerEvent)>,
}

impl ScriptedRecognizer {
    fn silent() -> Self {
        Self {
            available: true,
            after_audio_ends: true,
            steps: vec![],
        }
    }

    fn live(steps: Vec<(u64, RecognizerEvent)>) -> Self {
        Self {
            available: true,
            after_audio_ends: false,
            steps,
        }
    }
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn recognize(
        &self,
        mut audio: mpsc::UnboundedReceiver<AudioChunk>,
        events: mpsc::UnboundedSender<RecognizerEvent>,
    ) {
        if self.after_audio_ends {
            while audio.recv().await.is_some() {}
        }
        for (delay_ms, event) in &self.steps {
            tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
            let _ = events.send(event.clone());
        }
        std::future::pending::<()>().await;
    }
}

fn controller(
    source: Arc<MockSource>,
    recognizer: ScriptedRecognizer,
) -> (ListeningController, mpsc::UnboundedReceiver<ListenEvent>) {
    ListeningController::spawn(ListenConfig::default(), source, Arc::new(recognizer))
}

fn partial(text: &str) -> RecognizerEvent {
    RecognizerEvent::Partial(text.to_string())
}

const FIVE_SECS: Duration = Duration::from_secs(5);

#[tokio::test(start_paused = true)]
async fn silent_session_ends_empty_after_capture_and_grace() {
    let source = Arc::new(MockSource::default());
    let (listener, mut events) = controller(source.clone(), ScriptedRecognizer::silent());

    let started = Instant::now();
    listener.start_listening(FIVE_SECS).await.unwrap();
    assert!(listener.is_listening());

    assert_eq!(events.recv().await, Some(ListenEvent::Final(Transcript::Empty)));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(6500), "finished after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(6600), "finished after {:?}", elapsed);

    assert!(!listener.is_listening());
    assert_eq!(source.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn partials_precede_the_single_final() {
    let source = Arc::new(MockSource::default());
    let recognizer = ScriptedRecognizer::live(vec![
        (300, partial("ein")),
        (300, partial("ein Bier")),
        (300, RecognizerEvent::Final("ein Bier bitte".to_string())),
    ]);
    let (listener, mut events) = controller(source, recognizer);
    listener.start_listening(FIVE_SECS).await.unwrap();

    assert_eq!(events.recv().await, Some(ListenEvent::Partial("ein".into())));
    assert_eq!(events.recv().await, Some(ListenEvent::Partial("ein Bier".into())));
    assert_eq!(
        events.recv().await,
        Some(ListenEvent::Final(Transcript::Text("ein Bier bitte".into())))
    );

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(listener.status().transcript, "ein Bier bitte");
}

#[tokio::test(start_paused = true)]
async fn stop_finalizes_once_with_latest_partial() {
    let source = Arc::new(MockSource::default());
    let recognizer = ScriptedRecognizer::live(vec![
        (200, partial("  wie spät  ")),
        (5000, RecognizerEvent::Final("zu spät".to_string())),
    ]);
    let (listener, mut events) = controller(source.clone(), recognizer);
    listener.start_listening(FIVE_SECS).await.unwrap();

    assert!(matches!(events.recv().await, Some(ListenEvent::Partial(_))));
    listener.stop_listening();
    listener.stop_listening();

    assert_eq!(
        events.recv().await,
        Some(ListenEvent::Final(Transcript::Text("wie spät".into())))
    );

    // The capture and grace timers and the recognizer's late final are all ignored.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(source.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_during_grace_finalizes_once() {
    let source = Arc::new(MockSource::default());
    let (listener, mut events) = controller(source.clone(), ScriptedRecognizer::silent());
    listener.start_listening(FIVE_SECS).await.unwrap();

    tokio::time::sleep(Duration::from_millis(5200)).await;
    assert_eq!(listener.status().phase, ListenPhase::Finalizing);
    assert!(listener.is_listening());

    listener.stop_listening();
    assert_eq!(events.recv().await, Some(ListenEvent::Final(Transcript::Empty)));
    assert!(!listener.is_listening());

    // The grace timer fires into a finished session.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(source.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_device_open_does_not_eat_the_session() {
    let source = Arc::new(MockSource {
        open_delay: Duration::from_secs(2),
        ..Default::default()
    });
    let (listener, mut events) = controller(source.clone(), ScriptedRecognizer::silent());

    let started = Instant::now();
    let ticks = AtomicUsize::new(0);
    let ticker = async {
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(500)).await;
            ticks.fetch_add(1, Ordering::SeqCst);
            assert_eq!(listener.status().phase, ListenPhase::Idle);
        }
    };
    let (opened, ()) = tokio::join!(listener.start_listening(FIVE_SECS), ticker);
    opened.unwrap();
    assert_eq!(ticks.load(Ordering::SeqCst), 3);
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(listener.status().phase, ListenPhase::Capturing);

    // Capture and grace are counted from the moment the device is open.
    assert_eq!(events.recv().await, Some(ListenEvent::Final(Transcript::Empty)));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(8500), "finished after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(8600), "finished after {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn final_during_grace_finishes_early() {
    let source = Arc::new(MockSource::default());
    let recognizer = ScriptedRecognizer {
        available: true,
        after_audio_ends: true,
        steps: vec![(500, RecognizerEvent::Final("noch eins".to_string()))],
    };
    let (listener, mut events) = controller(source, recognizer);

    let started = Instant::now();
    listener.start_listening(FIVE_SECS).await.unwrap();
    assert_eq!(
        events.recv().await,
        Some(ListenEvent::Final(Transcript::Text("noch eins".into())))
    );
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(5500) && elapsed < Duration::from_millis(6500));
}

#[tokio::test(start_paused = true)]
async fn no_speech_is_an_empty_result() {
    let source = Arc::new(MockSource::default());
    let recognizer = ScriptedRecognizer::live(vec![(100, RecognizerEvent::Error(RecognitionError::NoSpeech))]);
    let (listener, mut events) = controller(source, recognizer);
    listener.start_listening(FIVE_SECS).await.unwrap();

    assert_eq!(events.recv().await, Some(ListenEvent::Final(Transcript::Empty)));
    assert_eq!(listener.status().last_error, None);
}

#[tokio::test(start_paused = true)]
async fn recognizer_error_keeps_partial_and_records_error() {
    let source = Arc::new(MockSource::default());
    let recognizer = ScriptedRecognizer::live(vec![
        (100, partial("Prost")),
        (100, RecognizerEvent::Error(RecognitionError::Failed("network down".into()))),
    ]);
    let (listener, mut events) = controller(source, recognizer);
    listener.start_listening(FIVE_SECS).await.unwrap();

    assert_eq!(events.recv().await, Some(ListenEvent::Partial("Prost".into())));
    assert_eq!(
        events.recv().await,
        Some(ListenEvent::Final(Transcript::Text("Prost".into())))
    );
    assert_eq!(listener.status().last_error.as_deref(), Some("network down"));
}

#[tokio::test(start_paused = true)]
async fn unavailable_recognizer_refuses_to_start() {
    let source = Arc::new(MockSource::default());
    let recognizer = ScriptedRecognizer {
        available: false,
        ..ScriptedRecognizer::silent()
    };
    let (listener, mut events) = controller(source.clone(), recognizer);

    let err = listener.start_listening(FIVE_SECS).await.unwrap_err();
    assert!(matches!(err, VoiceError::RecognizerUnavailable(_)));
    assert!(!listener.is_listening());
    assert_eq!(source.starts.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn audio_failure_is_reported_without_transcript() {
    let source = Arc::new(MockSource {
        fail: true,
        ..Default::default()
    });
    let (listener, mut events) = controller(source, ScriptedRecognizer::silent());

    assert!(listener.start_listening(FIVE_SECS).await.is_err());
    let status = listener.status();
    assert!(!status.is_listening());
    assert!(status.last_error.is_some());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn start_while_listening_is_ignored_and_sessions_restart() {
    let source = Arc::new(MockSource::default());
    let (listener, mut events) = controller(source.clone(), ScriptedRecognizer::silent());

    listener.start_listening(FIVE_SECS).await.unwrap();
    listener.start_listening(FIVE_SECS).await.unwrap();
    assert_eq!(source.starts.load(Ordering::SeqCst), 1);

    listener.stop_listening();
    assert_eq!(events.recv().await, Some(ListenEvent::Final(Transcript::Empty)));

    listener.start_listening(Duration::from_secs(1)).await.unwrap();
    assert_eq!(source.starts.load(Ordering::SeqCst), 2);
    assert_eq!(events.recv().await, Some(ListenEvent::Final(Transcript::Empty)));
    assert!(events.try_recv().is_err());
}

// ---------------------------------------------------------------------------
// Speaker mocks
// ---------------------------------------------------------------------------

/// Records `start:<voice>:<text>` and `end:<text>` entries.
#[derive(Default)]
struct MockVoice {
    installed: HashSet<String>,
    broken: HashSet<String>,
    log: Mutex<Vec<String>>,
    utterance: Duration,
}

impl MockVoice {
    fn with(installed: &[&str], broken: &[&str]) -> Self {
        Self {
            installed: installed.iter().map(|v| v.to_string()).collect(),
            broken: broken.iter().map(|v| v.to_string()).collect(),
            log: Mutex::new(vec![]),
            utterance: Duration::from_secs(1),
        }
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalVoice for MockVoice {
    async fn has_voice(&self, voice_id: &str) -> bool {
        self.installed.contains(voice_id)
    }

    async fn speak(&self, text: &str, voice_id: &str) -> VoiceResult<()> {
        self.log.lock().unwrap().push(format!("start:{}:{}", voice_id, text));
        if self.broken.contains(voice_id) {
            return Err(VoiceError::LocalVoice(format!("{} crashed", voice_id)));
        }
        tokio::time::sleep(self.utterance).await;
        self.log.lock().unwrap().push(format!("end:{}", text));
        Ok(())
    }
}

struct MockRemote {
    fail: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl RemoteSynthesizer for MockRemote {
    async fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        if self.fail {
            Err(VoiceError::Tts("401 Unauthorized".to_string()))
        } else {
            Ok(text.as_bytes().to_vec())
        }
    }
}

#[derive(Default)]
struct MockSink {
    played: Mutex<Vec<Vec<u8>>>,
    halts: AtomicUsize,
}

#[async_trait]
impl AudioSink for MockSink {
    async fn play(&self, bytes: Vec<u8>) -> VoiceResult<()> {
        self.played.lock().unwrap().push(bytes);
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok(())
    }

    fn halt(&self) {
        self.halts.fetch_add(1, Ordering::SeqCst);
    }
}

fn local_only(voice: Arc<MockVoice>) -> SpeakerQueue {
    SpeakerQueue::spawn(
        SpeakerConfig::default(),
        SpeakerBackends {
            remote: None,
            sink: None,
            local: voice,
        },
    )
}

#[tokio::test(start_paused = true)]
async fn basic_voice_speaks_when_nothing_better_exists() {
    let voice = Arc::new(MockVoice::with(&["de"], &[]));
    let speaker = local_only(voice.clone());

    speaker.speak("A");
    let mut state = speaker.subscribe();
    state.wait_for(|s| s.is_speaking).await.unwrap();
    assert_eq!(speaker.state().active_backend, SpeechBackend::BasicLocal);

    speaker.wait_idle().await;
    assert!(!speaker.is_speaking());
    assert_eq!(voice.log(), vec!["start:de:A", "end:A"]);
}

#[tokio::test(start_paused = true)]
async fn utterances_play_in_order_without_overlap() {
    let voice = Arc::new(MockVoice::with(&[], &[]));
    let speaker = local_only(voice.clone());

    speaker.speak("a");
    speaker.speak("   ");
    speaker.speak("b");
    speaker.wait_idle().await;

    assert_eq!(voice.log(), vec!["start:de:a", "end:a", "start:de:b", "end:b"]);
}

#[tokio::test(start_paused = true)]
async fn stop_silences_current_and_drops_queue() {
    let voice = Arc::new(MockVoice {
        utterance: Duration::from_secs(10),
        ..MockVoice::with(&[], &[])
    });
    let speaker = local_only(voice.clone());

    speaker.speak("lange Geschichte");
    speaker.speak("danach");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(speaker.is_speaking());
    assert_eq!(speaker.state().queued, 1);

    speaker.stop();
    speaker.wait_idle().await;
    assert!(!speaker.is_speaking());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(voice.log(), vec!["start:de:lange Geschichte"]);

    // The queue keeps working after a stop.
    speaker.speak("weiter");
    speaker.wait_idle().await;
    assert_eq!(voice.log().last().map(String::as_str), Some("end:weiter"));
}

#[tokio::test(start_paused = true)]
async fn enhanced_voice_is_preferred_in_configured_order() {
    let voice = Arc::new(MockVoice::with(&["mb-de4", "mb-de2", "de"], &[]));
    let speaker = local_only(voice.clone());

    speaker.speak("Moin");
    speaker.wait_idle().await;
    assert_eq!(voice.log(), vec!["start:mb-de4:Moin", "end:Moin"]);
    assert_eq!(speaker.state().active_backend, SpeechBackend::EnhancedLocal);
}

#[tokio::test(start_paused = true)]
async fn broken_enhanced_voice_falls_back_to_basic() {
    let voice = Arc::new(MockVoice::with(&["mb-de6"], &["mb-de6"]));
    let speaker = local_only(voice.clone());

    speaker.speak("Prost");
    speaker.wait_idle().await;
    assert_eq!(voice.log(), vec!["start:mb-de6:Prost", "start:de:Prost", "end:Prost"]);
    assert_eq!(speaker.state().active_backend, SpeechBackend::BasicLocal);
}

#[tokio::test(start_paused = true)]
async fn remote_synthesis_plays_through_sink() {
    let voice = Arc::new(MockVoice::with(&["mb-de6"], &[]));
    let remote = Arc::new(MockRemote {
        fail: false,
        calls: AtomicUsize::new(0),
    });
    let sink = Arc::new(MockSink::default());
    let speaker = SpeakerQueue::spawn(
        SpeakerConfig::default(),
        SpeakerBackends {
            remote: Some(remote.clone()),
            sink: Some(sink.clone()),
            local: voice.clone(),
        },
    );

    speaker.speak("Hallo");
    speaker.wait_idle().await;
    assert_eq!(sink.played.lock().unwrap().as_slice(), &[b"Hallo".to_vec()]);
    assert!(voice.log().is_empty());
    assert_eq!(speaker.state().active_backend, SpeechBackend::Remote);
}

#[tokio::test(start_paused = true)]
async fn remote_failure_falls_back_locally() {
    let voice = Arc::new(MockVoice::with(&["mb-de2"], &[]));
    let remote = Arc::new(MockRemote {
        fail: true,
        calls: AtomicUsize::new(0),
    });
    let sink = Arc::new(MockSink::default());
    let speaker = SpeakerQueue::spawn(
        SpeakerConfig::default(),
        SpeakerBackends {
            remote: Some(remote.clone()),
            sink: Some(sink.clone()),
            local: voice.clone(),
        },
    );

    speaker.speak("Noch eins?");
    speaker.wait_idle().await;
    assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    assert!(sink.played.lock().unwrap().is_empty());
    assert_eq!(voice.log(), vec!["start:mb-de2:Noch eins?", "end:Noch eins?"]);
    assert_eq!(speaker.state().active_backend, SpeechBackend::EnhancedLocal);
}

#[tokio::test(start_paused = true)]
async fn stop_halts_remote_playback() {
    let voice = Arc::new(MockVoice::with(&[], &[]));
    let sink = Arc::new(MockSink::default());
    let speaker = SpeakerQueue::spawn(
        SpeakerConfig::default(),
        SpeakerBackends {
            remote: Some(Arc::new(MockRemote {
                fail: false,
                calls: AtomicUsize::new(0),
            })),
            sink: Some(sink.clone()),
            local: voice,
        },
    );

    speaker.speak("Ruhe jetzt");
    let mut state = speaker.subscribe();
    state
        .wait_for(|s| s.active_backend == SpeechBackend::Remote)
        .await
        .unwrap();
    speaker.stop();
    speaker.wait_idle().await;
    assert_eq!(sink.halts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_during_remote_synthesis_plays_nothing() {
    let voice = Arc::new(MockVoice::with(&["mb-de4"], &[]));
    let remote = Arc::new(MockRemote {
        fail: false,
        calls: AtomicUsize::new(0),
    });
    let sink = Arc::new(MockSink::default());
    let speaker = SpeakerQueue::spawn(
        SpeakerConfig::default(),
        SpeakerBackends {
            remote: Some(remote.clone()),
            sink: Some(sink.clone()),
            local: voice.clone(),
        },
    );

    speaker.speak("Letzte Runde");
    speaker.speak("und tschüss");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(speaker.is_speaking());
    assert_eq!(remote.calls.load(Ordering::SeqCst), 1);

    speaker.stop();
    speaker.wait_idle().await;
    assert!(!speaker.is_speaking());

    // Neither the synthesized audio nor a local fallback reaches the room.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(sink.played.lock().unwrap().is_empty());
    assert!(voice.log().is_empty());
    assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Hardware
// ---------------------------------------------------------------------------

#[tokio::test]
#[ignore] // Requires a microphone
async fn test_cpal_capture_delivers_chunks() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let source = taproom_voice::CpalSource::default();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut handle = source.start(tx).await.expect("open microphone");
    let chunk = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("chunk within 2s")
        .expect("stream open");
    assert!(!chunk.samples.is_empty());
    handle.stop();
}

#[tokio::test]
#[ignore] // Requires espeak-ng and speakers
async fn test_espeak_basic_voice() {
    let voice = taproom_voice::EspeakVoice::default();
    assert!(voice.has_voice("de").await);
    voice.speak("Prost!", "de").await.expect("speak");
}
