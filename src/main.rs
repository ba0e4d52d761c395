//! Voice Pendant - Console Entry Point
//!
//! Reads transcripts from stdin as if they came from the recognizer, prints
//! what the pendant would say, and echoes machine instructions instead of
//! sending them to a controller.

use clap::Parser;
use voice_pendant::conversation::{ConversationState, Event, Session, SessionOutput};
use voice_pendant::core::config::{load_config, PendantConfig};
use voice_pendant::core::error::{PendantError, Result};
use voice_pendant::core::types::{ProbeType, UnitsPreference};
use voice_pendant::machine::{
    MachineUpdate, ProbeReporter, ProbeRequest, Prober, SettingsListener, Transport,
};
use voice_pendant::nlu::LlmClient;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "voice-pendant")]
#[command(about = "Type what the operator would say; see what the pendant does")]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Speak and hear inches instead of millimeters
    #[arg(long, default_value_t = false)]
    imperial: bool,

    /// Allow "run the job" to start a program
    #[arg(long, default_value_t = false)]
    allow_job_start: bool,

    /// Use only the fallback grammar
    #[arg(long, default_value_t = false)]
    no_nlu: bool,

    /// Execute motion without asking for confirmation
    #[arg(long, default_value_t = false)]
    no_confirm: bool,

    /// Require the wake word (":wake") before each command
    #[arg(long, default_value_t = false)]
    push_to_talk: bool,

    /// Make every simulated probe fail
    #[arg(long, default_value_t = false)]
    probe_fails: bool,
}

/// Prints instructions instead of writing them to a serial port
struct ConsoleTransport;

impl Transport for ConsoleTransport {
    fn send(&self, instruction: &str) {
        println!("  -> {}", instruction);
    }

    fn send_cycle_start(&self) {
        println!("  -> ~ (cycle start)");
    }

    fn send_soft_reset(&self) {
        println!("  -> ^X (soft reset)");
    }
}

/// Pretends to probe after a short delay
struct SimulatedProber {
    fail: bool,
}

#[async_trait]
impl Prober for SimulatedProber {
    async fn probe(&self, request: &ProbeRequest, reporter: &ProbeReporter) -> Result<()> {
        println!(
            "  -> probing {} with {} (probe feed {}, rapid {})",
            request.axis.as_str(),
            request.probe_type.spoken_name(),
            request.params.probe_feed,
            request.params.rapid_feed
        );
        reporter.started();
        tokio::time::sleep(Duration::from_millis(800)).await;
        if self.fail {
            return Err(PendantError::Probe("no contact".into()));
        }
        Ok(())
    }
}

struct PrintingSettings;

impl SettingsListener for PrintingSettings {
    fn on_feed_changed(&self, feed_mm_per_min: f64) {
        println!("  [settings] feed {} mm/min", feed_mm_per_min);
    }

    fn on_step_changed(&self, step_mm: f64) {
        println!("  [settings] step {} mm", step_mm);
    }

    fn on_probe_type_changed(&self, probe_type: ProbeType) {
        println!("  [settings] probe {}", probe_type.spoken_name());
    }
}

fn build_config(args: &Args) -> Result<PendantConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => PendantConfig::default(),
    };

    if args.imperial {
        config.parser.units = UnitsPreference::Imperial;
    }
    if args.allow_job_start {
        config.parser.allow_job_start = true;
    }
    if args.no_nlu {
        config.parser.nlu_enabled = false;
        config.llm.enabled = false;
    }
    if args.no_confirm {
        config.conversation.require_confirmation = false;
    }
    config.conversation.continuous_listening = !args.push_to_talk;

    config.validate().map_err(PendantError::Config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_pendant=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;
    tracing::info!(units = ?config.parser.units, "voice pendant starting");

    let llm_client = if config.llm.enabled {
        match LlmClient::from_config(&config.llm) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "remote intent classifier disabled");
                None
            }
        }
    } else {
        None
    };

    let (session, handle, mut outputs) = Session::new(
        config,
        Arc::new(ConsoleTransport),
        Arc::new(SimulatedProber {
            fail: args.probe_fails,
        }),
    );
    let mut session = session.with_settings_listener(Arc::new(PrintingSettings));
    if let Some(client) = llm_client {
        session = session.with_llm_client(client);
    }
    let session_task = tokio::spawn(session.run());

    // Speech output: print, then report that speaking finished
    let speaker = handle.clone();
    let printer = tokio::spawn(async move {
        while let Some(output) = outputs.recv().await {
            match output {
                SessionOutput::Speak(text) => {
                    println!("pendant: {}", text);
                    speaker.speech_finished();
                }
                SessionOutput::StateChanged(state) => {
                    if let ConversationState::Error { message, .. } = &state {
                        println!("  [error] {}", message);
                    }
                    tracing::debug!(state = state.name(), "state");
                }
            }
        }
    });

    println!("\n=== VOICE PENDANT ===");
    println!("Type what you would say to the machine.");
    println!();
    println!("Console commands:");
    println!("  :wake          - Wake word");
    println!("  :listen        - Start listening");
    println!("  :alarm         - Simulate a machine alarm");
    println!("  :idle          - Simulate the alarm clearing");
    println!("  :pos <x y z>   - Report a work position in mm");
    println!("  :quit          - Exit");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let mut words = input.split_whitespace();
        match words.next() {
            Some(":quit") | Some(":q") => break,
            Some(":wake") => {
                handle.wake_word();
            }
            Some(":listen") => {
                handle.send_event(Event::StartListening { continuous: false });
            }
            Some(":alarm") => {
                handle.update_machine(MachineUpdate::status("Alarm:1"));
            }
            Some(":idle") => {
                handle.update_machine(MachineUpdate::status("Idle"));
            }
            Some(":pos") => {
                let coords: Vec<f64> = words.filter_map(|w| w.parse().ok()).collect();
                if let [x, y, z] = coords[..] {
                    handle.update_machine(MachineUpdate {
                        work_x: Some(x),
                        work_y: Some(y),
                        work_z: Some(z),
                        ..MachineUpdate::default()
                    });
                } else {
                    println!("usage: :pos <x> <y> <z>");
                }
            }
            _ => {
                handle.send_transcript(input);
            }
        }
    }

    handle.shutdown();
    let _ = session_task.await;
    printer.abort();
    tracing::info!("voice pendant stopped");
    Ok(())
}
