//! Voice session loop
//!
//! One task owns the conversation state, the parser context and the
//! executor. Everything else (operator input, executor completions, timers,
//! transcription and remote classification) reaches it as a message, so all
//! mutation happens in one place.

use super::machine::ConversationStateMachine;
use super::state::{ConversationState, Event};
use crate::command::executor::{
    command_delay, CommandExecutor, ExecutorEvent, DEFAULT_DELAY, PROBE_DELAY,
};
use crate::command::history::PendantContext;
use crate::command::instructions;
use crate::command::resolver::{CommandResolver, Reply};
use crate::command::types::{Command, CommandType};
use crate::core::config::{ConversationConfig, PendantConfig};
use crate::core::error::Result;
use crate::core::types::ProbeId;
use crate::machine::{MachineStateSnapshot, MachineUpdate, Prober, SettingsListener, Transport};
use crate::nlu::{classify_intent, IntentResult, LlmClient};
use crate::speech::{AudioEvent, Transcriber, UtteranceBuffer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Spoken when the machine enters alarm
pub const ALARM_PROMPT: &str = "Machine alarm. Say unlock or home to continue.";
const NOT_UNDERSTOOD: &str = "Sorry, I didn't understand that";
const YES_OR_NO: &str = "Please say yes or no";

/// Messages accepted by a running session
#[derive(Debug, Clone)]
pub enum SessionMessage {
    Audio(AudioEvent),
    /// Text from an external recognizer or a console
    Transcript(String),
    WakeWord,
    /// Raw conversation event, e.g. `StartListening` from a push-to-talk button
    Conversation(Event),
    /// The output side finished speaking
    SpeechFinished,
    MachineUpdate(MachineUpdate),
    Shutdown,
}

/// What the session wants the outside world to know
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutput {
    Speak(String),
    StateChanged(ConversationState),
}

/// Completions produced by the session's own background tasks
#[derive(Debug)]
enum Internal {
    ChainStepDue { generation: u64 },
    WakeTimeout { generation: u64 },
    Transcribed { epoch: u64, result: Result<Option<String>> },
    Classified { epoch: u64, text: String, result: Result<IntentResult> },
}

/// Cloneable sender side of a session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: UnboundedSender<SessionMessage>,
}

impl SessionHandle {
    fn send(&self, message: SessionMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    pub fn send_transcript(&self, text: impl Into<String>) -> bool {
        self.send(SessionMessage::Transcript(text.into()))
    }

    pub fn send_audio(&self, event: AudioEvent) -> bool {
        self.send(SessionMessage::Audio(event))
    }

    pub fn wake_word(&self) -> bool {
        self.send(SessionMessage::WakeWord)
    }

    pub fn send_event(&self, event: Event) -> bool {
        self.send(SessionMessage::Conversation(event))
    }

    pub fn update_machine(&self, update: MachineUpdate) -> bool {
        self.send(SessionMessage::MachineUpdate(update))
    }

    pub fn speech_finished(&self) -> bool {
        self.send(SessionMessage::SpeechFinished)
    }

    pub fn shutdown(&self) -> bool {
        self.send(SessionMessage::Shutdown)
    }
}

/// Cancellable one-shot timer; stale firings are told apart by generation
#[derive(Debug, Default)]
struct Timer {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl Timer {
    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.generation += 1;
    }

    fn is_current(&self, generation: u64) -> bool {
        self.handle.is_some() && self.generation == generation
    }

    fn fired(&mut self) {
        self.handle = None;
    }
}

pub struct Session {
    conversation: ConversationConfig,
    ctx: PendantContext,
    resolver: CommandResolver,
    executor: CommandExecutor,
    machine: ConversationStateMachine,
    snapshot: MachineStateSnapshot,
    transcriber: Option<Arc<dyn Transcriber>>,
    llm: Option<Arc<LlmClient>>,
    audio: UtteranceBuffer,
    chain_timer: Timer,
    wake_timer: Timer,
    active_probe: Option<ProbeId>,
    /// Bumped on every new utterance and on STOP; async results from an
    /// older epoch are dropped
    epoch: u64,
    /// Machine status reads as alarm
    alarm_active: bool,
    /// Raised with the alarm; lifted once a clearing command runs or the
    /// status clears. While set, the session parks in `AwaitingUnlock`.
    alarm_lock: bool,
    inbox: UnboundedReceiver<SessionMessage>,
    executor_events: UnboundedReceiver<ExecutorEvent>,
    internal_tx: UnboundedSender<Internal>,
    internal_rx: UnboundedReceiver<Internal>,
    outputs: UnboundedSender<SessionOutput>,
}

impl Session {
    /// Build a session and the channels to drive it
    pub fn new(
        config: PendantConfig,
        transport: Arc<dyn Transport>,
        prober: Arc<dyn Prober>,
    ) -> (Self, SessionHandle, UnboundedReceiver<SessionOutput>) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let (events_tx, executor_events) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (outputs, outputs_rx) = mpsc::unbounded_channel();

        let mut machine = ConversationStateMachine::new();
        let state_tx = outputs.clone();
        machine.add_listener(move |_, new| {
            let _ = state_tx.send(SessionOutput::StateChanged(new.clone()));
        });

        let mut snapshot = MachineStateSnapshot::default();
        snapshot.current_feed = config.parser.feed_rate;
        snapshot.current_step = config.parser.step_size;
        snapshot.units = config.parser.units;

        let session = Self {
            conversation: config.conversation,
            ctx: PendantContext::new(config.parser),
            resolver: CommandResolver::new(),
            executor: CommandExecutor::new(transport, prober, events_tx),
            machine,
            snapshot,
            transcriber: None,
            llm: None,
            audio: UtteranceBuffer::default(),
            chain_timer: Timer::default(),
            wake_timer: Timer::default(),
            active_probe: None,
            epoch: 0,
            alarm_active: false,
            alarm_lock: false,
            inbox,
            executor_events,
            internal_tx,
            internal_rx,
            outputs,
        };
        (session, SessionHandle { tx }, outputs_rx)
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn with_llm_client(mut self, client: Arc<LlmClient>) -> Self {
        self.llm = Some(client);
        self
    }

    pub fn with_settings_listener(mut self, listener: Arc<dyn SettingsListener>) -> Self {
        self.resolver = std::mem::take(&mut self.resolver).with_settings_listener(listener);
        self
    }

    pub fn state(&self) -> &ConversationState {
        self.machine.state()
    }

    pub fn context(&self) -> &PendantContext {
        &self.ctx
    }

    /// Drive the session until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        info!(
            continuous = self.conversation.continuous_listening,
            confirm = self.conversation.require_confirmation,
            "voice session started"
        );
        if self.conversation.continuous_listening {
            self.apply(Event::StartListening { continuous: true });
        }

        loop {
            tokio::select! {
                // Completions first so they are never overtaken by newer input
                biased;

                Some(event) = self.executor_events.recv() => self.handle_executor_event(event),
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal),
                message = self.inbox.recv() => match message {
                    Some(SessionMessage::Shutdown) | None => break,
                    Some(message) => self.handle_message(message),
                },
            }
        }

        self.chain_timer.cancel();
        self.wake_timer.cancel();
        info!("voice session stopped");
    }

    fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Audio(event) => self.handle_audio(event),
            SessionMessage::Transcript(text) => self.handle_transcript(&text),
            SessionMessage::WakeWord => self.handle_wake_word(),
            SessionMessage::Conversation(event) => {
                self.apply(event);
            }
            SessionMessage::SpeechFinished => {
                self.apply(Event::SpeakingCompleted);
            }
            SessionMessage::MachineUpdate(update) => self.handle_machine_update(update),
            SessionMessage::Shutdown => {}
        }
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::ChainStepDue { generation } => {
                if !self.chain_timer.is_current(generation) {
                    debug!(generation, "stale chain timer");
                    return;
                }
                self.chain_timer.fired();
                self.apply(Event::ChainStepCompleted);
            }
            Internal::WakeTimeout { generation } => {
                if !self.wake_timer.is_current(generation) {
                    return;
                }
                self.wake_timer.fired();
                info!("no command after wake word");
                self.apply(Event::WakeWordTimeout);
            }
            Internal::Transcribed { epoch, result } => {
                if epoch != self.epoch {
                    debug!(epoch, current = self.epoch, "stale transcription dropped");
                    return;
                }
                match result {
                    Ok(Some(text)) => self.handle_transcript(&text),
                    Ok(None) => debug!("nothing intelligible in utterance"),
                    Err(e) => warn!(error = %e, "transcription failed"),
                }
            }
            Internal::Classified { epoch, text, result } => {
                if epoch != self.epoch || !self.accepts_input() {
                    debug!(epoch, current = self.epoch, "stale classification dropped");
                    return;
                }
                let commands = match result {
                    Ok(intent) => self
                        .resolver
                        .resolve_with_intent(&text, &intent, &mut self.ctx)
                        .into_iter()
                        .collect(),
                    Err(e) => {
                        warn!(error = %e, "remote classification failed, using local parser");
                        self.resolver.parse_utterance(&text, &mut self.ctx)
                    }
                };
                self.dispatch(commands);
            }
        }
    }

    fn handle_audio(&mut self, event: AudioEvent) {
        match event {
            AudioEvent::Chunk(samples) => {
                self.audio.push(&samples);
                if self.audio.is_full() {
                    self.finish_utterance();
                }
            }
            AudioEvent::SpeechStarted => self.audio.mark_speech(),
            AudioEvent::SilenceDetected | AudioEvent::CaptureStopped => self.finish_utterance(),
        }
    }

    fn finish_utterance(&mut self) {
        if !self.audio.heard_speech() {
            self.audio.clear();
            return;
        }
        let samples = self.audio.take();
        let Some(transcriber) = self.transcriber.clone() else {
            warn!(samples = samples.len(), "no transcriber configured, utterance dropped");
            return;
        };

        debug!(samples = samples.len(), "transcribing utterance");
        let epoch = self.epoch;
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = transcriber.transcribe(&samples).await;
            let _ = tx.send(Internal::Transcribed { epoch, result });
        });
    }

    fn handle_transcript(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.epoch += 1;
        info!(transcript = text, state = self.machine.state().name(), "heard");

        if self.resolver.is_stop(text) {
            self.emergency_stop();
            return;
        }

        if !self.accepts_input() {
            debug!(state = self.machine.state().name(), "not accepting input");
            return;
        }

        if matches!(self.machine.state(), ConversationState::AwaitingConfirmation { .. }) {
            match self.resolver.parse_reply(text) {
                Some(Reply::Confirm) => {
                    self.apply(Event::ConfirmationReceived);
                }
                Some(Reply::Cancel) => {
                    self.apply(Event::CancellationReceived);
                    self.speak("Cancelled");
                }
                None => self.speak(YES_OR_NO),
            }
            return;
        }

        if let Some(client) = self.remote_classifier(text) {
            let epoch = self.epoch;
            let normalized = self.resolver.normalize(text);
            let tx = self.internal_tx.clone();
            debug!(text = %normalized, "classifying remotely");
            tokio::spawn(async move {
                let result = classify_intent(&client, &normalized).await;
                let _ = tx.send(Internal::Classified {
                    epoch,
                    text: normalized,
                    result,
                });
            });
            return;
        }

        let commands = self.resolver.parse_utterance(text, &mut self.ctx);
        self.dispatch(commands);
    }

    /// Remote classifier for single-command utterances, when configured
    fn remote_classifier(&self, text: &str) -> Option<Arc<LlmClient>> {
        let client = self.llm.as_ref()?;
        (self.ctx.config.nlu_enabled && !self.resolver.is_chain(text)).then(|| Arc::clone(client))
    }

    fn handle_wake_word(&mut self) {
        let timeout = self.conversation.wake_timeout();
        self.apply(Event::WakeWordDetected { timeout });
        if matches!(self.machine.state(), ConversationState::AwaitingCommandAfterWake { .. }) {
            self.start_wake_timer(timeout);
        }
    }

    fn handle_machine_update(&mut self, update: MachineUpdate) {
        self.snapshot.apply(update);
        let alarm = self.snapshot.is_alarm();

        if alarm && !self.alarm_active {
            self.alarm_active = true;
            self.alarm_lock = true;
            warn!(status = %self.snapshot.status, "machine alarm");
            self.apply(Event::AlarmRaised);
            self.speak(ALARM_PROMPT);
        } else if !alarm && self.alarm_active {
            self.alarm_active = false;
            self.alarm_lock = false;
            info!(status = %self.snapshot.status, "alarm cleared");
            if matches!(self.machine.state(), ConversationState::AwaitingUnlock) {
                self.apply(Event::Reset);
            }
        }
    }

    fn handle_executor_event(&mut self, event: ExecutorEvent) {
        match event {
            ExecutorEvent::Executed { .. } => self.step_finished(),
            ExecutorEvent::Answer { text } => {
                self.step_finished();
                self.speak(&text);
            }
            ExecutorEvent::ProbeStarted { id } => {
                if self.active_probe != Some(id) {
                    debug!(%id, "stale probe start");
                    return;
                }
                info!(%id, "probe started");
                if matches!(self.machine.state(), ConversationState::ExecutingChain { .. }) {
                    self.start_chain_timer(PROBE_DELAY);
                }
            }
            ExecutorEvent::ProbeSucceeded { id } => {
                if self.active_probe != Some(id) {
                    debug!(%id, "stale probe result ignored");
                    return;
                }
                self.active_probe = None;
                info!(%id, "probe succeeded");
                match self.machine.state() {
                    ConversationState::ExecutingCommand { .. } => {
                        self.apply(Event::CommandExecuted);
                    }
                    // Whether or not a start signal armed the long pause, the
                    // next step follows after the ordinary one
                    ConversationState::ExecutingChain { .. } => {
                        self.start_chain_timer(DEFAULT_DELAY);
                    }
                    _ => {}
                }
                self.speak("Probe complete");
            }
            ExecutorEvent::ProbeFailed { id, reason } => {
                if self.active_probe != Some(id) {
                    debug!(%id, "stale probe failure ignored");
                    return;
                }
                self.active_probe = None;
                let message = format!("Probe failed: {}", reason);
                warn!(%id, %reason, "probe failed");
                self.apply(Event::ErrorOccurred {
                    message: message.clone(),
                    retryable: true,
                });
                self.speak(&message);
            }
        }
    }

    /// The executing command (or chain step) has been forwarded
    fn step_finished(&mut self) {
        let chain_delay = match self.machine.state() {
            ConversationState::ExecutingCommand { .. } => None,
            ConversationState::ExecutingChain { commands, index } => {
                Some(commands.get(*index).map(command_delay))
            }
            other => {
                debug!(state = other.name(), "completion outside execution");
                return;
            }
        };
        match chain_delay {
            None => {
                self.apply(Event::CommandExecuted);
            }
            Some(Some(delay)) => self.start_chain_timer(delay),
            Some(None) => {
                self.apply(Event::ChainCompleted);
            }
        }
    }

    /// STOP from any state: halt motion and drop whatever was in flight
    fn emergency_stop(&mut self) {
        warn!(state = self.machine.state().name(), "stop requested");
        self.chain_timer.cancel();
        self.wake_timer.cancel();
        self.active_probe = None;
        self.audio.clear();
        self.executor
            .execute_command(&instructions::stop(), &mut self.ctx, &self.snapshot);

        // Feed hold does not lift the alarm lock; apply() parks the session again
        self.apply(Event::Reset);
    }

    fn accepts_input(&self) -> bool {
        self.machine.can_accept_input()
            || matches!(self.machine.state(), ConversationState::AwaitingUnlock)
    }

    fn dispatch(&mut self, commands: Vec<Command>) {
        let locked = self.alarm_lock;

        match commands.len() {
            0 => self.speak(NOT_UNDERSTOOD),
            1 => {
                let Some(command) = commands.into_iter().next() else {
                    return;
                };
                if command.is_blocked() {
                    warn!(reason = %command.description, "command blocked");
                    self.speak(&command.description);
                    return;
                }
                if locked && !command.command_type.clears_alarm() {
                    self.speak(ALARM_PROMPT);
                    return;
                }
                let needs_confirmation = self.needs_confirmation(&command);
                let prompt = format!("{}. Say yes to confirm.", command.description);
                self.apply(Event::CommandParsed {
                    command,
                    needs_confirmation,
                });
                if needs_confirmation {
                    self.speak(&prompt);
                }
            }
            count => {
                if locked {
                    self.speak(ALARM_PROMPT);
                    return;
                }
                let needs_confirmation = commands.iter().any(|c| self.needs_confirmation(c));
                let prompt = format!(
                    "{} commands: {}. Say yes to confirm.",
                    count,
                    commands
                        .iter()
                        .map(|c| c.description.as_str())
                        .collect::<Vec<_>>()
                        .join(", then ")
                );
                self.apply(Event::ChainedCommandsParsed {
                    commands,
                    needs_confirmation,
                });
                if needs_confirmation {
                    self.speak(&prompt);
                }
            }
        }
    }

    fn needs_confirmation(&self, command: &Command) -> bool {
        if !self.conversation.require_confirmation {
            return false;
        }
        match command.command_type {
            CommandType::Jog
            | CommandType::Move
            | CommandType::Probe
            | CommandType::Home
            | CommandType::Zero
            | CommandType::Workspace
            | CommandType::ToolChange
            | CommandType::Spindle
            | CommandType::Undo => true,
            CommandType::Repeat => self
                .ctx
                .history
                .last_command()
                .map_or(false, |last| self.needs_confirmation(last)),
            CommandType::Stop
            | CommandType::Resume
            | CommandType::Reset
            | CommandType::Unlock
            | CommandType::Setting
            | CommandType::Blocked
            | CommandType::Query
            | CommandType::Coolant => false,
        }
    }

    /// Feed an event to the state machine and run the side effects of the
    /// state it lands in
    fn apply(&mut self, event: Event) -> bool {
        if !self.machine.handle(event) {
            return false;
        }

        let state = self.machine.state().clone();
        if !matches!(state, ConversationState::ExecutingChain { .. }) {
            self.chain_timer.cancel();
        }
        if !matches!(state, ConversationState::AwaitingCommandAfterWake { .. }) {
            self.wake_timer.cancel();
        }
        if !matches!(
            state,
            ConversationState::ExecutingCommand { .. } | ConversationState::ExecutingChain { .. }
        ) {
            self.active_probe = None;
        }

        match state {
            // Input states are off limits until the alarm lock is lifted
            ConversationState::Idle
            | ConversationState::Listening { .. }
            | ConversationState::AwaitingCommandAfterWake { .. }
                if self.alarm_lock =>
            {
                self.apply(Event::AlarmRaised);
            }
            ConversationState::ExecutingCommand { command } => {
                if !self.run_command(&command) {
                    self.apply(Event::CommandExecuted);
                }
            }
            ConversationState::ExecutingChain { commands, index } => {
                let Some(command) = commands.get(index) else {
                    self.apply(Event::ChainCompleted);
                    return true;
                };
                info!(step = index + 1, of = commands.len(), command = %command.command_type, "chain step");
                if !self.run_command(command) {
                    self.apply(Event::ChainStepCompleted);
                }
            }
            ConversationState::Idle if self.conversation.continuous_listening => {
                self.apply(Event::StartListening { continuous: true });
            }
            ConversationState::Error { retryable: true, .. }
                if self.conversation.continuous_listening =>
            {
                self.apply(Event::StartListening { continuous: true });
            }
            _ => {}
        }
        true
    }

    fn run_command(&mut self, command: &Command) -> bool {
        self.active_probe = None;
        if self.alarm_lock && command.command_type.clears_alarm() {
            info!(command = %command.command_type, "alarm lock lifted");
            self.alarm_lock = false;
        }
        let handled = self
            .executor
            .execute_command(command, &mut self.ctx, &self.snapshot);
        if let Some(id) = self.executor.take_dispatched_probe() {
            self.active_probe = Some(id);
        }
        if handled && command.command_type == CommandType::Setting {
            self.snapshot.current_feed = self.ctx.config.feed_rate;
            self.snapshot.current_step = self.ctx.config.step_size;
            self.snapshot.units = self.ctx.config.units;
        }
        handled
    }

    fn start_chain_timer(&mut self, delay: Duration) {
        self.chain_timer.cancel();
        let generation = self.chain_timer.generation;
        let tx = self.internal_tx.clone();
        debug!(delay_ms = delay.as_millis() as u64, "next chain step scheduled");
        self.chain_timer.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Internal::ChainStepDue { generation });
        }));
    }

    fn start_wake_timer(&mut self, timeout: Duration) {
        self.wake_timer.cancel();
        let generation = self.wake_timer.generation;
        let tx = self.internal_tx.clone();
        self.wake_timer.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(Internal::WakeTimeout { generation });
        }));
    }

    /// Say something. Idle and listening states show it as `Speaking`;
    /// prompts during confirmation or execution are only voiced.
    fn speak(&mut self, message: &str) {
        info!(message, "speak");
        let _ = self.outputs.send(SessionOutput::Speak(message.to_string()));

        let resume_after = match self.machine.state() {
            ConversationState::Listening { .. } => true,
            ConversationState::Idle | ConversationState::AwaitingUnlock => false,
            ConversationState::Speaking { resume_after, .. } => *resume_after,
            _ => return,
        };
        self.apply(Event::SpeakingStarted {
            message: message.to_string(),
            resume_after,
        });
    }
}
