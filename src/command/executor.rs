//! Command execution - forwards resolved commands to the machine

use crate::command::history::PendantContext;
use crate::command::instructions::QueryKind;
use crate::command::types::{Command, CommandType};
use crate::core::error::{PendantError, Result};
use crate::core::types::{format_number, ProbeAxis, ProbeId, ProbeType, UnitsPreference};
use crate::machine::{
    MachineStateSnapshot, ProbeParams, ProbeReporter, ProbeRequest, Prober, Transport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

/// Pause after a jog or move before the next chained command
pub const MOTION_DELAY: Duration = Duration::from_millis(1500);
/// Pause after a probe before the next chained command
pub const PROBE_DELAY: Duration = Duration::from_millis(30_000);
/// Pause after anything else
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// Completion signals sent back to the session
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorEvent {
    /// Instruction forwarded (or setting applied)
    Executed { command_type: CommandType, description: String },
    /// Spoken answer to a QUERY
    Answer { text: String },
    ProbeStarted { id: ProbeId },
    ProbeSucceeded { id: ProbeId },
    ProbeFailed { id: ProbeId, reason: String },
}

/// Executes commands against the transport and prober
pub struct CommandExecutor {
    transport: Arc<dyn Transport>,
    prober: Arc<dyn Prober>,
    events: UnboundedSender<ExecutorEvent>,
    last_probe: Option<ProbeId>,
}

impl CommandExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        prober: Arc<dyn Prober>,
        events: UnboundedSender<ExecutorEvent>,
    ) -> Self {
        Self {
            transport,
            prober,
            events,
            last_probe: None,
        }
    }

    /// Execute one command. Returns false when nothing was done.
    pub fn execute_command(
        &mut self,
        cmd: &Command,
        ctx: &mut PendantContext,
        machine: &MachineStateSnapshot,
    ) -> bool {
        ctx.history.record(cmd);

        match cmd.command_type {
            CommandType::Blocked => {
                warn!(reason = %cmd.description, "blocked command not executed");
                false
            }
            CommandType::Resume => {
                self.transport.send_cycle_start();
                self.executed(cmd);
                true
            }
            CommandType::Reset => {
                self.transport.send_soft_reset();
                self.executed(cmd);
                true
            }
            CommandType::Stop
            | CommandType::Home
            | CommandType::Unlock
            | CommandType::Workspace
            | CommandType::Zero
            | CommandType::Jog
            | CommandType::Move
            | CommandType::Undo
            | CommandType::ToolChange
            | CommandType::Spindle
            | CommandType::Coolant => {
                self.transport.send(&cmd.payload);
                self.executed(cmd);
                true
            }
            CommandType::Repeat => match ctx.history.last_command().cloned() {
                Some(last) => self.execute_command(&last, ctx, machine),
                None => {
                    warn!("nothing to repeat");
                    false
                }
            },
            // Applied when the command was resolved
            CommandType::Setting => {
                self.executed(cmd);
                true
            }
            CommandType::Query => match query_kind(&cmd.payload) {
                Ok(kind) => {
                    let text = answer_query(kind, machine, ctx);
                    info!(answer = %text, "query answered");
                    let _ = self.events.send(ExecutorEvent::Answer { text });
                    true
                }
                Err(e) => {
                    warn!(error = %e, "unreadable query");
                    false
                }
            },
            CommandType::Probe => match parse_probe_payload(&cmd.payload) {
                Ok((axis, probe_type)) => {
                    self.dispatch_probe(axis, probe_type);
                    true
                }
                Err(e) => {
                    warn!(error = %e, "unreadable probe command");
                    false
                }
            },
        }
    }

    /// Id of the probe started by the most recent PROBE command, if any
    pub fn take_dispatched_probe(&mut self) -> Option<ProbeId> {
        self.last_probe.take()
    }

    fn executed(&self, cmd: &Command) {
        info!(command = %cmd.command_type, payload = %cmd.payload, "executed");
        let _ = self.events.send(ExecutorEvent::Executed {
            command_type: cmd.command_type,
            description: cmd.description.clone(),
        });
    }

    fn dispatch_probe(&mut self, axis: ProbeAxis, probe_type: ProbeType) {
        let request = ProbeRequest {
            id: ProbeId::new(),
            axis,
            probe_type,
            params: ProbeParams::defaults(axis, probe_type),
        };
        let reporter = ProbeReporter::new(request.id, self.events.clone());
        self.last_probe = Some(request.id);
        info!(axis = axis.as_str(), probe_type = probe_type.as_str(), "probe dispatched");

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                reporter.failed("no async runtime available for probing");
                return;
            }
        };

        let prober = Arc::clone(&self.prober);
        handle.spawn(async move {
            match prober.probe(&request, &reporter).await {
                Ok(()) => reporter.succeeded(),
                Err(e) => reporter.failed(e.to_string()),
            }
        });
    }
}

/// Pacing delay before the next command of a chain
pub fn command_delay(cmd: &Command) -> Duration {
    match cmd.command_type {
        CommandType::Jog | CommandType::Move | CommandType::Undo => MOTION_DELAY,
        CommandType::Probe => PROBE_DELAY,
        _ => DEFAULT_DELAY,
    }
}

/// Decompose `PROBE:<axis>:<type>`
pub fn parse_probe_payload(payload: &str) -> Result<(ProbeAxis, ProbeType)> {
    let mut parts = payload.split(':');
    let (Some("PROBE"), Some(axis), Some(probe_type), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(PendantError::InvalidPayload(payload.to_string()));
    };
    let axis = ProbeAxis::parse(axis)
        .ok_or_else(|| PendantError::InvalidPayload(format!("unknown probe axis in {}", payload)))?;
    let probe_type = ProbeType::parse(probe_type)
        .ok_or_else(|| PendantError::InvalidPayload(format!("unknown probe type in {}", payload)))?;
    Ok((axis, probe_type))
}

fn query_kind(payload: &str) -> Result<QueryKind> {
    payload
        .strip_prefix("QUERY:")
        .and_then(QueryKind::parse)
        .ok_or_else(|| PendantError::InvalidPayload(payload.to_string()))
}

fn length(units: UnitsPreference, mm: f64) -> String {
    format!("{:.1}", units.from_mm(mm))
}

fn feed(units: UnitsPreference, mm_per_min: f64) -> String {
    match units {
        UnitsPreference::Metric => format!("{:.0}", mm_per_min),
        UnitsPreference::Imperial => format!("{:.1}", units.from_mm(mm_per_min)),
    }
}

/// Spoken answer computed from the machine snapshot
pub fn answer_query(kind: QueryKind, machine: &MachineStateSnapshot, ctx: &PendantContext) -> String {
    let units = machine.units;
    let unit_name = units.length_name();
    match kind {
        QueryKind::Position => format!(
            "Work position X {}, Y {}, Z {} {}",
            length(units, machine.work_x),
            length(units, machine.work_y),
            length(units, machine.work_z),
            unit_name
        ),
        QueryKind::Status => format!("Machine is {}", machine.status),
        QueryKind::Feed => format!(
            "Feed rate is {} {}",
            feed(units, machine.current_feed),
            units.feed_name()
        ),
        QueryKind::Step => format!(
            "Step size is {} {}",
            format_number(units.from_mm(machine.current_step)),
            unit_name
        ),
        QueryKind::DistanceToZero => format!(
            "{} {} from work zero",
            length(units, machine.work_distance()),
            unit_name
        ),
        QueryKind::DistanceToHome => format!(
            "{} {} from home",
            length(units, machine.machine_distance()),
            unit_name
        ),
        QueryKind::Travel => format!(
            "Travel from home: X {}, Y {}, Z {} {}",
            length(units, machine.machine_x.abs()),
            length(units, machine.machine_y.abs()),
            length(units, machine.machine_z.abs()),
            unit_name
        ),
        QueryKind::ProbeType => format!("Using the {}", ctx.config.probe_type.spoken_name()),
    }
}
