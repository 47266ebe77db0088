//! Medscribe - dictate a consultation, extract prescription fields, render
//! the document.
//!
//! Speech is captured continuously (Whisper + Silero VAD via sherpa-onnx),
//! finalized segments are debounced into a growing transcript, a Gemini
//! completion call extracts the clinical fields, and the edited result is
//! rendered as a paginated prescription document.

mod audio;
mod capture;
mod command;
mod config;
mod document;
mod extract;
mod fields;
mod notify;
mod session;
mod stt;
mod transcript;

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use capture::{CaptureController, CaptureOutcome};
use command::Command;
use config::AppConfig;
use extract::{ExtractError, ExtractionClient};
use fields::FieldMap;
use notify::{LogNotifier, Notify};
use session::Session;
use stt::{EngineEvent, SherpaEngine};
use transcript::DebouncedAccumulator;

/// Events reported back to the command loop by background work.
enum PipelineEvent {
    Extraction(Result<FieldMap, ExtractError>),
}

struct App {
    session: Session,
    controller: CaptureController,
    accumulator: DebouncedAccumulator,
    client: Arc<ExtractionClient>,
    notifier: Arc<dyn Notify>,
    config: AppConfig,
    pipeline_tx: mpsc::Sender<PipelineEvent>,
    extract_in_flight: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_args();

    // Respect RUST_LOG env var, fallback to verbose flag, default to info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| if config.verbose { EnvFilter::try_new("debug") } else { EnvFilter::try_new("info") })
        .unwrap();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    info!("🩺 Medscribe v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("❌ Configuration error: {}", e);
        std::process::exit(1);
    }
    config.log_config();

    // A failed engine means capture is unavailable: the start command becomes
    // a no-op and the rest of the pipeline still works on manual transcripts.
    let (controller, mut engine_rx) = match SherpaEngine::new(&config) {
        Ok((engine, rx)) => (CaptureController::new(Box::new(engine)), rx),
        Err(e) => {
            warn!("Speech capture unavailable: {}", e);
            let (_tx, rx) = mpsc::channel(1);
            (CaptureController::unavailable(), rx)
        }
    };

    let client = Arc::new(ExtractionClient::new(&config)?);
    let notifier: Arc<dyn Notify> = Arc::new(LogNotifier);
    let accumulator = DebouncedAccumulator::new(tokio::time::Duration::from_millis(config.quiet_window_ms));

    let (pipeline_tx, mut pipeline_rx) = mpsc::channel::<PipelineEvent>(4);

    let mut app = App {
        session: Session::new(),
        controller,
        accumulator,
        client,
        notifier,
        config,
        pipeline_tx,
        extract_in_flight: false,
    };

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Received Ctrl+C, shutting down...");
            ctrl_c_cancel.cancel();
        }
    });

    info!("Type 'help' for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !app.handle_line(&line) {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read input: {}", e);
                        break;
                    }
                }
            }
            Some(event) = engine_rx.recv() => {
                match event {
                    EngineEvent::Segment(segment) => app.accumulator.push(&segment.text),
                    EngineEvent::SessionEnded => app.controller.on_session_ended(),
                }
            }
            _ = app.accumulator.quiesced() => {
                app.flush_batch();
            }
            Some(event) = pipeline_rx.recv() => {
                app.handle_pipeline_event(event);
            }
            _ = cancel.cancelled() => {
                break;
            }
        }
    }

    app.controller.shutdown();
    info!("✅ Medscribe stopped");
    Ok(())
}

impl App {
    /// Handle one console line. Returns `false` when the loop should exit.
    fn handle_line(&mut self, line: &str) -> bool {
        let command = match command::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return true,
            Err(e) => {
                self.notifier.notify(&e.0);
                return true;
            }
        };

        match command {
            Command::Start => self.handle_start(),
            Command::Stop => self.handle_stop(),
            Command::Restart => self.handle_restart(),
            Command::Show => self.show(),
            Command::Copy => println!("{}", self.session.transcript),
            Command::Edit => {
                self.session.editing_enabled = !self.session.editing_enabled;
                self.notifier.notify(if self.session.editing_enabled { "Edit mode on" } else { "Edit mode off" });
            }
            Command::SetTranscript(text) => {
                if self.require_edit_mode() {
                    // Manual override: bypasses the accumulator; a pending
                    // debounced batch still appends afterwards
                    self.session.transcript = text;
                    self.notifier.notify("Transcript updated");
                }
            }
            Command::SetField(field, text) => {
                if self.require_edit_mode() {
                    match self.session.extracted.as_mut() {
                        Some(map) => {
                            map.set_from_text(field, &text);
                            self.notifier.notify(&format!("Updated '{}'", field.label()));
                        }
                        None => self.notifier.notify("Nothing extracted yet, run 'extract' first"),
                    }
                }
            }
            Command::Facility(name) => {
                self.session.facility_name = name;
                self.notifier.notify("Facility name set");
            }
            Command::Extract => self.handle_extract(),
            Command::Generate => self.handle_generate(),
            Command::Help => println!("{}", command::HELP),
            Command::Quit => return false,
        }
        true
    }

    fn handle_start(&mut self) {
        match self.controller.start() {
            Ok(CaptureOutcome::Started) => self.notifier.notify("Speech recognition started"),
            Ok(CaptureOutcome::AlreadyListening) => debug!("Already listening"),
            Ok(CaptureOutcome::Unavailable) => debug!("Capture unavailable, start ignored"),
            Ok(_) => {}
            Err(e) => self.notifier.notify(&format!("Failed to start listening: {}", e)),
        }
    }

    fn handle_stop(&mut self) {
        if self.controller.stop() == CaptureOutcome::Stopped {
            self.notifier.notify("Speech recognition stopped");
        }
    }

    /// Append a quiesced batch to the transcript, after any manual edits.
    fn flush_batch(&mut self) {
        if let Some(batch) = self.accumulator.take_batch() {
            debug!("Appending debounced batch ({} chars)", batch.len());
            self.session.append_transcript(&batch);
        }
    }

    fn handle_restart(&mut self) {
        // Clear state first so the new session starts from an empty transcript
        self.session.reset();
        let _ = self.accumulator.take_batch();
        match self.controller.restart() {
            Ok(CaptureOutcome::Started) => self.notifier.notify("Transcript cleared, listening again"),
            Ok(CaptureOutcome::Unavailable) => self.notifier.notify("Transcript cleared"),
            Ok(_) => {}
            Err(e) => self.notifier.notify(&format!("Failed to restart listening: {}", e)),
        }
    }

    /// Exactly one extraction in flight at a time; a second trigger is
    /// rejected rather than queued.
    fn handle_extract(&mut self) {
        if self.extract_in_flight {
            self.notifier.notify("Extraction already in progress");
            return;
        }
        if self.session.transcript.trim().is_empty() {
            self.notifier.notify("Transcript is empty, nothing to extract");
            return;
        }

        self.extract_in_flight = true;
        self.notifier.notify("Extracting prescription fields...");

        let client = self.client.clone();
        let transcript = self.session.transcript.clone();
        let pipeline_tx = self.pipeline_tx.clone();
        tokio::spawn(async move {
            let result = client.extract(&transcript).await;
            if pipeline_tx.send(PipelineEvent::Extraction(result)).await.is_err() {
                debug!("Pipeline channel closed, dropping extraction result");
            }
        });
    }

    fn handle_pipeline_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Extraction(Ok(map)) => {
                self.extract_in_flight = false;
                self.session.extracted = Some(map);
                self.notifier.notify("Information extracted; set the facility name before generating the document");
                self.show();
            }
            PipelineEvent::Extraction(Err(e)) => {
                // Failure preserves any previously extracted state
                self.extract_in_flight = false;
                self.notifier.notify(&format!("Extraction failed: {}", e));
            }
        }
    }

    fn handle_generate(&mut self) {
        let document = match document::render(self.session.extracted.as_ref(), &self.session.facility_name) {
            Ok(document) => document,
            Err(e) => {
                self.notifier.notify(&e.to_string());
                return;
            }
        };
        match document.write_to(&self.config.output_dir) {
            Ok(path) => self.notifier.notify(&format!("Document written to {}", path.display())),
            Err(e) => self.notifier.notify(&format!("Failed to write document: {}", e)),
        }
    }

    fn show(&self) {
        println!("--- Transcript ({}) ---", if self.controller.is_listening() { "listening" } else { "not listening" });
        println!("{}", self.session.transcript);
        if let Some(map) = &self.session.extracted {
            println!("--- Extracted fields ---");
            for (i, (field, value)) in map.iter().enumerate() {
                println!("{}. {}: {}", i + 1, field.label(), value.display());
            }
        }
        if !self.session.facility_name.is_empty() {
            println!("Facility: {}", self.session.facility_name);
        }
    }

    fn require_edit_mode(&self) -> bool {
        if self.session.editing_enabled {
            true
        } else {
            self.notifier.notify("Enable edit mode first with 'edit'");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use notify::testing::RecordingNotifier;

    fn test_app(notifier: RecordingNotifier) -> App {
        let config = AppConfig::try_parse_from(["medscribe", "--gemini-api-key", "test-key"]).unwrap();
        let client = Arc::new(ExtractionClient::new(&config).unwrap());
        let (pipeline_tx, _pipeline_rx) = mpsc::channel(4);
        App {
            session: Session::new(),
            controller: CaptureController::unavailable(),
            accumulator: DebouncedAccumulator::new(tokio::time::Duration::from_millis(500)),
            client,
            notifier: Arc::new(notifier),
            config,
            pipeline_tx,
            extract_in_flight: false,
        }
    }

    #[tokio::test]
    async fn generate_without_extraction_notifies_and_writes_nothing() {
        let notifier = RecordingNotifier::new();
        let mut app = test_app(notifier.clone());
        app.session.facility_name = "City Clinic".into();
        app.handle_line("generate");
        let messages = notifier.messages();
        assert!(messages.iter().any(|m| m.contains("extract the information")), "got {:?}", messages);
    }

    #[tokio::test]
    async fn generate_without_facility_name_notifies_distinctly() {
        let notifier = RecordingNotifier::new();
        let mut app = test_app(notifier.clone());
        app.session.extracted = Some(FieldMap::with_sentinels());
        app.handle_line("generate");
        let messages = notifier.messages();
        assert!(messages.iter().any(|m| m.contains("facility name")), "got {:?}", messages);
    }

    #[tokio::test]
    async fn second_extract_while_in_flight_is_rejected() {
        let notifier = RecordingNotifier::new();
        let mut app = test_app(notifier.clone());
        app.session.transcript = "patient has a fever".into();
        app.extract_in_flight = true;
        app.handle_line("extract");
        assert!(notifier.messages().iter().any(|m| m.contains("already in progress")));
    }

    #[tokio::test]
    async fn extract_with_empty_transcript_is_rejected() {
        let notifier = RecordingNotifier::new();
        let mut app = test_app(notifier.clone());
        app.handle_line("extract");
        assert!(notifier.messages().iter().any(|m| m.contains("nothing to extract")));
        assert!(!app.extract_in_flight);
    }

    #[tokio::test]
    async fn edits_require_edit_mode() {
        let notifier = RecordingNotifier::new();
        let mut app = test_app(notifier.clone());
        app.handle_line("transcript new text");
        assert!(app.session.transcript.is_empty());
        assert!(notifier.messages().iter().any(|m| m.contains("edit mode")));

        app.handle_line("edit");
        app.handle_line("transcript new text");
        assert_eq!(app.session.transcript, "new text");
    }

    #[tokio::test]
    async fn field_edit_splits_list_fields_on_line_boundaries() {
        let notifier = RecordingNotifier::new();
        let mut app = test_app(notifier.clone());
        app.session.extracted = Some(FieldMap::with_sentinels());
        app.handle_line("edit");
        app.handle_line("set 8 Paracetamol\\nIbuprofen\\n");
        let map = app.session.extracted.as_ref().unwrap();
        assert_eq!(
            map.get(fields::Field::MedicineNames),
            &fields::FieldValue::List(vec!["Paracetamol".into(), "Ibuprofen".into(), "".into()])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restart_drops_a_buffered_batch() {
        let notifier = RecordingNotifier::new();
        let mut app = test_app(notifier);
        app.session.transcript = "earlier dictation".into();
        app.accumulator.push("patient has a fever");

        app.handle_line("restart");
        tokio::time::sleep(tokio::time::Duration::from_millis(600)).await;
        app.flush_batch();

        assert!(app.session.transcript.is_empty(), "got {:?}", app.session.transcript);
    }

    #[tokio::test]
    async fn pending_batch_appends_after_a_manual_override() {
        let notifier = RecordingNotifier::new();
        let mut app = test_app(notifier);
        app.accumulator.push("buffered burst");

        app.handle_line("edit");
        app.handle_line("transcript corrected opening");
        app.flush_batch();

        assert_eq!(app.session.transcript, "corrected opening buffered burst");
    }

    #[tokio::test]
    async fn extraction_failure_preserves_previous_fields() {
        let notifier = RecordingNotifier::new();
        let mut app = test_app(notifier.clone());
        let mut previous = FieldMap::with_sentinels();
        previous.set_from_text(fields::Field::PersonName, "Ada");
        app.session.extracted = Some(previous.clone());
        app.extract_in_flight = true;

        app.handle_pipeline_event(PipelineEvent::Extraction(Err(ExtractError::NoJsonObject)));
        assert!(!app.extract_in_flight);
        assert_eq!(app.session.extracted, Some(previous));
        assert!(notifier.messages().iter().any(|m| m.contains("Extraction failed")));
    }
}
