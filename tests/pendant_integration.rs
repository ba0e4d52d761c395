//! Integration tests for transcript -> command -> machine instruction

use voice_pendant::command::{
    CommandExecutor, CommandResolver, CommandType, ExecutorEvent, PendantContext,
};
use voice_pendant::core::error::Result;
use voice_pendant::core::types::{Axis, UnitsPreference};
use voice_pendant::machine::{
    MachineStateSnapshot, ProbeReporter, ProbeRequest, Prober, Transport,
};
use voice_pendant::text::fuzzy::fuzzy_contains;
use voice_pendant::text::TextNormalizer;

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver};

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<String>>,
}

impl RecordingTransport {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, instruction: &str) {
        self.sent.lock().unwrap().push(instruction.to_string());
    }
    fn send_cycle_start(&self) {
        self.sent.lock().unwrap().push("~".into());
    }
    fn send_soft_reset(&self) {
        self.sent.lock().unwrap().push("0x18".into());
    }
}

struct UnusedProber;

#[async_trait::async_trait]
impl Prober for UnusedProber {
    async fn probe(&self, _request: &ProbeRequest, _reporter: &ProbeReporter) -> Result<()> {
        Ok(())
    }
}

struct Pendant {
    resolver: CommandResolver,
    executor: CommandExecutor,
    ctx: PendantContext,
    machine: MachineStateSnapshot,
    transport: Arc<RecordingTransport>,
    events: UnboundedReceiver<ExecutorEvent>,
}

impl Pendant {
    fn new() -> Self {
        let transport = Arc::new(RecordingTransport::default());
        let (tx, events) = mpsc::unbounded_channel();
        Self {
            resolver: CommandResolver::new(),
            executor: CommandExecutor::new(transport.clone(), Arc::new(UnusedProber), tx),
            ctx: PendantContext::default(),
            machine: MachineStateSnapshot::default(),
            transport,
            events,
        }
    }

    /// Resolve and execute one utterance; returns the resolved command type
    fn say(&mut self, text: &str) -> Option<CommandType> {
        let cmd = self.resolver.parse_command(text, &mut self.ctx)?;
        self.executor.execute_command(&cmd, &mut self.ctx, &self.machine);
        Some(cmd.command_type)
    }

    fn answers(&mut self) -> Vec<String> {
        let mut answers = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if let ExecutorEvent::Answer { text } = event {
                answers.push(text);
            }
        }
        answers
    }
}

#[test]
fn test_stop_wins_over_job_start() {
    let mut pendant = Pendant::new();
    pendant.ctx.config.allow_job_start = true;
    assert_eq!(pendant.say("stop and run the job"), Some(CommandType::Stop));
    assert_eq!(pendant.transport.sent(), vec!["!"]);
}

#[test]
fn test_compound_jog_reaches_transport() {
    let mut pendant = Pendant::new();
    assert_eq!(pendant.say("jog left 10 and forward 5"), Some(CommandType::Jog));
    assert_eq!(pendant.transport.sent(), vec!["$J=G91 G21 X-10 Y-5 F1000"]);

    let last = pendant.ctx.history.last_jog().cloned().unwrap();
    assert_eq!(last.get(&Axis::X), Some(&-10.0));
    assert_eq!(last.get(&Axis::Y), Some(&-5.0));
}

#[test]
fn test_negative_coordinate_is_sent_as_absolute_move() {
    let mut pendant = Pendant::new();
    assert_eq!(pendant.say("move to x -5 y 10"), Some(CommandType::Move));
    assert_eq!(pendant.say("go to x -5"), Some(CommandType::Move));
    assert_eq!(
        pendant.transport.sent(),
        vec!["G21 G90 G0 X-5 Y10", "G21 G90 G0 X-5"]
    );
    assert!(pendant.ctx.history.last_jog().is_none());
}

#[test]
fn test_zero_x_and_z_is_refused() {
    let mut pendant = Pendant::new();
    assert_eq!(pendant.say("zero x and z"), Some(CommandType::Blocked));
    assert!(pendant.transport.sent().is_empty());
}

#[test]
fn test_jog_undo_repeat_cycle() {
    let mut pendant = Pendant::new();
    pendant.say("jog left 10 and forward 5");
    assert_eq!(pendant.say("undo"), Some(CommandType::Undo));
    assert_eq!(pendant.say("undo"), Some(CommandType::Blocked));
    assert_eq!(pendant.say("repeat"), Some(CommandType::Repeat));

    assert_eq!(
        pendant.transport.sent(),
        vec![
            "$J=G91 G21 X-10 Y-5 F1000",
            "$J=G91 G21 X10 Y5 F1000",
            "$J=G91 G21 X-10 Y-5 F1000",
        ]
    );
}

#[test]
fn test_repeat_with_empty_history_explains_itself() {
    let mut pendant = Pendant::new();
    let cmd = pendant
        .resolver
        .parse_command("repeat that", &mut pendant.ctx)
        .unwrap();
    assert!(cmd.is_blocked());
    assert!(!cmd.description.is_empty());
    assert!(cmd.payload.is_empty());
}

#[test]
fn test_job_start_is_blocked_unless_permitted() {
    let mut pendant = Pendant::new();
    assert_eq!(pendant.say("run the job"), Some(CommandType::Blocked));
    assert!(pendant.transport.sent().is_empty());

    pendant.ctx.config.allow_job_start = true;
    assert_eq!(pendant.say("run the job"), Some(CommandType::Resume));
    assert_eq!(pendant.transport.sent(), vec!["~"]);
}

#[test]
fn test_feed_query_in_imperial() {
    let mut pendant = Pendant::new();
    pendant.machine.units = UnitsPreference::Imperial;
    pendant.machine.current_feed = 1000.0;
    assert_eq!(pendant.say("what is the feed rate"), Some(CommandType::Query));
    assert_eq!(pendant.answers(), vec!["Feed rate is 39.4 inches per minute"]);
    assert!(pendant.transport.sent().is_empty());
}

#[test]
fn test_feed_setting_changes_later_jogs() {
    let mut pendant = Pendant::new();
    assert_eq!(pendant.say("set feed rate 500"), Some(CommandType::Setting));
    assert_eq!(pendant.ctx.config.feed_rate, 500.0);
    pendant.say("jog right 2");
    assert_eq!(pendant.transport.sent(), vec!["$J=G91 G21 X2 F500"]);
}

#[test]
fn test_out_of_range_feed_yields_nothing() {
    let mut pendant = Pendant::new();
    assert_eq!(pendant.say("set feed rate 90000"), None);
    assert_eq!(pendant.ctx.config.feed_rate, 1000.0);
}

#[test]
fn test_chain_keeps_order() {
    let mut pendant = Pendant::new();
    let commands = pendant
        .resolver
        .parse_chained_commands("unlock then home then coolant off", &mut pendant.ctx);
    let types: Vec<_> = commands.iter().map(|c| c.command_type).collect();
    assert_eq!(
        types,
        vec![CommandType::Unlock, CommandType::Home, CommandType::Coolant]
    );
}

#[test]
fn test_misheard_direction_is_corrected() {
    let normalized = TextNormalizer::new().normalize("go write fifty");
    assert_eq!(fuzzy_contains(&normalized, &["go right"], 0.75), Some("go right"));
}

#[test]
fn test_garbage_resolves_to_nothing() {
    let mut pendant = Pendant::new();
    assert_eq!(pendant.say("banana smoothie please"), None);
    assert!(pendant.transport.sent().is_empty());
}
