//! Concrete speech engine: cpal microphone capture, Silero VAD segmentation,
//! and Whisper transcription via sherpa-onnx.
//!
//! The cpal stream is not `Send`, so it lives on a dedicated VAD thread that
//! also pumps start/stop control messages. Completed speech segments go to a
//! separate transcription thread (Whisper runs 100-500ms per segment and must
//! not stall segmentation); finalized text is delivered through the engine
//! event channel in completion order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use sherpa_rs::silero_vad::{SileroVad, SileroVadConfig};
use sherpa_rs::whisper::{WhisperConfig, WhisperRecognizer};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{EngineEvent, SpeechEngine, TranscriptSegment};
use crate::audio::{StreamResampler, device_name, mix_to_mono, pick_input_config};
use crate::config::AppConfig;

/// Minimum speech duration in seconds to be considered valid.
const MIN_SPEECH_DURATION: f32 = 0.1;

/// Maximum speech duration in seconds (prevents runaway segments).
const MAX_SPEECH_DURATION: f32 = 30.0;

/// VAD window size in samples (512 samples = 32ms at 16kHz).
const VAD_WINDOW_SIZE: i32 = 512;

/// Seconds of audio the VAD may buffer.
const VAD_BUFFER_SIZE_SECONDS: f32 = 60.0;

/// Bounded event channel; a full channel drops the segment rather than
/// stalling the transcription thread.
const EVENT_CHANNEL_CAPACITY: usize = 16;

enum Control {
    Start,
    Stop,
    Shutdown,
}

/// Gates delivery of recognition results back to the event loop.
///
/// `open` starts a new session generation; a result stamped during an earlier
/// generation is discarded even when the gate has already reopened. Without
/// the stamp, a stop followed immediately by a start (the restart path) would
/// reopen the gate while a transcription from the previous session is still
/// running, and its text would land in the fresh transcript.
struct ResultGate {
    accepting: AtomicBool,
    generation: AtomicU64,
}

impl ResultGate {
    fn new() -> Self {
        Self { accepting: AtomicBool::new(false), generation: AtomicU64::new(0) }
    }

    fn open(&self) {
        // Bump the generation before reopening so in-flight results from the
        // previous session can never pass both checks
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.accepting.store(true, Ordering::SeqCst);
    }

    fn close(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    /// Stamp for a segment captured now; checked again at delivery time.
    fn stamp(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn admits(&self, stamp: u64) -> bool {
        self.accepting.load(Ordering::SeqCst) && stamp == self.generation.load(Ordering::SeqCst)
    }
}

/// Speech engine backed by sherpa-onnx. See module docs for the thread layout.
pub struct SherpaEngine {
    control_tx: std_mpsc::Sender<Control>,
    gate: Arc<ResultGate>,
    vad_handle: Option<JoinHandle<()>>,
    whisper_handle: Option<JoinHandle<()>>,
}

impl SherpaEngine {
    /// Build the engine and return it with its event stream.
    ///
    /// # Errors
    /// Returns an error if no input device is available or the VAD/Whisper
    /// models fail to load; the caller treats that as capture being
    /// unavailable on this platform.
    pub fn new(config: &AppConfig) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (control_tx, control_rx) = std_mpsc::channel();
        let (speech_tx, speech_rx) = std_mpsc::sync_channel::<(u64, Vec<f32>)>(8);

        let gate = Arc::new(ResultGate::new());

        let whisper = build_whisper(config)?;
        let whisper_handle = spawn_whisper_thread(whisper, config.sample_rate, speech_rx, event_tx.clone(), gate.clone());

        let vad = build_vad(config)?;
        let vad_handle = spawn_vad_thread(config, vad, control_rx, speech_tx, event_tx, gate.clone())?;

        Ok((Self { control_tx, gate, vad_handle: Some(vad_handle), whisper_handle: Some(whisper_handle) }, event_rx))
    }
}

impl SpeechEngine for SherpaEngine {
    fn start(&mut self) -> Result<()> {
        self.gate.open();
        self.control_tx.send(Control::Start).context("Engine worker is gone")?;
        Ok(())
    }

    fn stop(&mut self) {
        self.gate.close();
        if self.control_tx.send(Control::Stop).is_err() {
            debug!("Engine worker already stopped");
        }
    }
}

impl Drop for SherpaEngine {
    fn drop(&mut self) {
        let _ = self.control_tx.send(Control::Shutdown);
        if let Some(handle) = self.vad_handle.take()
            && handle.join().is_err()
        {
            warn!("VAD thread panicked during shutdown");
        }
        if let Some(handle) = self.whisper_handle.take()
            && handle.join().is_err()
        {
            warn!("Transcription thread panicked during shutdown");
        }
    }
}

fn build_vad(config: &AppConfig) -> Result<SileroVad> {
    let vad_config = SileroVadConfig {
        model: config.vad_model_path().to_string_lossy().to_string(),
        threshold: config.vad_threshold,
        sample_rate: config.sample_rate,
        min_silence_duration: config.vad_silence_duration,
        min_speech_duration: MIN_SPEECH_DURATION,
        max_speech_duration: MAX_SPEECH_DURATION,
        window_size: VAD_WINDOW_SIZE,
        provider: Some(config.effective_provider().as_sherpa_provider().to_string()),
        num_threads: Some(1),
        debug: config.verbose,
    };
    SileroVad::new(vad_config, VAD_BUFFER_SIZE_SECONDS).map_err(|e| anyhow::anyhow!("Failed to initialize Silero VAD: {}", e))
}

fn build_whisper(config: &AppConfig) -> Result<WhisperRecognizer> {
    let whisper_config = WhisperConfig {
        encoder: config.whisper_encoder_path().to_string_lossy().to_string(),
        decoder: config.whisper_decoder_path().to_string_lossy().to_string(),
        tokens: config.whisper_tokens_path().to_string_lossy().to_string(),
        language: config.effective_stt_language().to_string(),
        provider: Some(config.effective_provider().as_sherpa_provider().to_string()),
        num_threads: Some(config.stt_threads.try_into().unwrap_or(2)),
        debug: config.verbose,
        ..Default::default()
    };
    WhisperRecognizer::new(whisper_config).map_err(|e| anyhow::anyhow!("Failed to initialize Whisper: {}", e))
}

/// Transcription worker: drains completed speech segments and emits finalized
/// transcript segments, preserving arrival order.
fn spawn_whisper_thread(
    mut whisper: WhisperRecognizer,
    sample_rate: u32,
    speech_rx: std_mpsc::Receiver<(u64, Vec<f32>)>,
    event_tx: mpsc::Sender<EngineEvent>,
    gate: Arc<ResultGate>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while let Ok((stamp, samples)) = speech_rx.recv() {
            if samples.is_empty() {
                continue;
            }
            debug!("Transcribing {} samples", samples.len());
            let result = whisper.transcribe(sample_rate, &samples);
            let text = result.text.trim().to_string();
            if text.is_empty() {
                debug!("Empty transcription result");
                continue;
            }
            // A stop or restart may have raced with this transcription
            if !gate.admits(stamp) {
                debug!("Discarding transcription from an ended session: {}", text);
                continue;
            }
            info!("🗣️  Recognized: {}", text);
            if event_tx.blocking_send(EngineEvent::Segment(TranscriptSegment { text })).is_err() {
                debug!("Event channel closed, transcription thread exiting");
                return;
            }
        }
        debug!("Speech channel closed, transcription thread exiting");
    })
}

/// VAD worker: owns the (non-`Send`) cpal stream, pumps control messages,
/// feeds captured audio to the VAD, and forwards completed speech segments.
fn spawn_vad_thread(
    config: &AppConfig,
    mut vad: SileroVad,
    control_rx: std_mpsc::Receiver<Control>,
    speech_tx: std_mpsc::SyncSender<(u64, Vec<f32>)>,
    event_tx: mpsc::Sender<EngineEvent>,
    gate: Arc<ResultGate>,
) -> Result<JoinHandle<()>> {
    let target_rate = config.sample_rate;

    // Probe the device up front so a missing microphone surfaces as a
    // construction error (capture unavailable), not a dead worker thread.
    let host = cpal::default_host();
    let device = host.default_input_device().context("No input device available")?;
    info!("Using input device: {}", device_name(&device));

    let supported = device.supported_input_configs().context("Failed to query input configs")?;
    let selected = pick_input_config(supported, target_rate)?;
    let device_rate = selected.sample_rate();
    let channels = selected.channels() as usize;
    let stream_config: StreamConfig = selected.config();

    if device_rate != target_rate {
        info!("Device rate {} Hz differs from target {} Hz, resampling enabled", device_rate, target_rate);
    }

    let handle = std::thread::spawn(move || {
        // Raw audio flows callback -> bounded channel -> this thread. try_send
        // keeps the audio callback non-blocking; overflow drops samples.
        let (sample_tx, sample_rx) = std_mpsc::sync_channel::<Vec<f32>>(32);
        let running = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));

        let mut resampler = match (device_rate != target_rate).then(|| StreamResampler::new(device_rate, target_rate)).transpose() {
            Ok(rs) => rs,
            Err(e) => {
                warn!("Failed to create resampler: {}", e);
                return;
            }
        };

        let running_cb = running.clone();
        let failed_cb = failed.clone();
        let stream = device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if !running_cb.load(Ordering::Relaxed) {
                    return;
                }
                let mono = mix_to_mono(data, channels);
                let samples = match resampler.as_mut() {
                    Some(rs) => rs.push(&mono),
                    None => Some(mono),
                };
                if let Some(samples) = samples
                    && sample_tx.try_send(samples).is_err()
                {
                    // Channel full; dropping is preferable to blocking the
                    // audio callback
                }
            },
            move |err| {
                tracing::error!("Audio stream error: {}", err);
                failed_cb.store(true, Ordering::SeqCst);
            },
            None,
        );

        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to build input stream: {}", e);
                return;
            }
        };

        let mut was_speaking = false;
        loop {
            // Control first, then audio, so stop/shutdown stay responsive
            match control_rx.recv_timeout(std::time::Duration::from_millis(10)) {
                Ok(Control::Start) => {
                    running.store(true, Ordering::SeqCst);
                    failed.store(false, Ordering::SeqCst);
                    if let Err(e) = stream.play() {
                        warn!("Failed to start audio stream: {}", e);
                    } else {
                        debug!("Audio stream playing");
                    }
                }
                Ok(Control::Stop) => {
                    running.store(false, Ordering::SeqCst);
                    let _ = stream.pause();
                    // Discard any speech the VAD was still holding and any
                    // raw audio still buffered from the ended session
                    while !vad.is_empty() {
                        vad.pop();
                    }
                    while sample_rx.try_recv().is_ok() {}
                    was_speaking = false;
                    debug!("Audio stream paused");
                }
                Ok(Control::Shutdown) => {
                    let _ = stream.pause();
                    debug!("VAD thread shutting down");
                    return;
                }
                Err(std_mpsc::RecvTimeoutError::Timeout) => {}
                Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                    let _ = stream.pause();
                    return;
                }
            }

            if failed.swap(false, Ordering::SeqCst) && running.swap(false, Ordering::SeqCst) {
                // Device went away mid-session; the controller decides
                // whether to resume
                if event_tx.blocking_send(EngineEvent::SessionEnded).is_err() {
                    return;
                }
                continue;
            }

            while let Ok(samples) = sample_rx.try_recv() {
                vad.accept_waveform(samples);

                let is_speech = vad.is_speech();
                if is_speech && !was_speaking {
                    debug!("Speech started");
                } else if !is_speech && was_speaking {
                    debug!("Speech ended");
                }
                was_speaking = is_speech;

                while !vad.is_empty() {
                    let segment = vad.front();
                    vad.pop();
                    if segment.samples.is_empty() {
                        continue;
                    }
                    debug!("Speech segment completed: {} samples", segment.samples.len());
                    if speech_tx.try_send((gate.stamp(), segment.samples.clone())).is_err() {
                        warn!("Transcription backlog full, dropping speech segment");
                    }
                }
            }
        }
    });

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_gate_admits_nothing() {
        let gate = ResultGate::new();
        let stamp = gate.stamp();
        assert!(!gate.admits(stamp));

        gate.open();
        gate.close();
        assert!(!gate.admits(gate.stamp()));
    }

    #[test]
    fn open_gate_admits_the_current_session() {
        let gate = ResultGate::new();
        gate.open();
        assert!(gate.admits(gate.stamp()));
    }

    #[test]
    fn restart_discards_results_from_the_previous_session() {
        let gate = ResultGate::new();
        gate.open();
        let stamp = gate.stamp();

        // stop immediately followed by start, as restart does
        gate.close();
        gate.open();

        assert!(!gate.admits(stamp), "pre-restart result slipped through the reopened gate");
        assert!(gate.admits(gate.stamp()));
    }
}
