//! Command builders shared by the intent mapping and the fallback grammar
//!
//! Real machine instructions use the grbl dialect. Work the machine cannot
//! express directly (probing, queries, settings) uses synthetic `KIND:ARG`
//! payloads that the executor decodes.

use crate::command::types::{Command, CommandType};
use crate::core::types::{format_number, Axis, JogVector, ProbeAxis, ProbeType, UnitsPreference};

/// Spindle speed used when none is spoken
pub const DEFAULT_SPINDLE_RPM: u32 = 10_000;
/// Tool number used when none is spoken
pub const DEFAULT_TOOL: u32 = 1;

/// What a QUERY command asks about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Position,
    Status,
    Feed,
    Step,
    DistanceToZero,
    DistanceToHome,
    Travel,
    ProbeType,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Position => "POSITION",
            QueryKind::Status => "STATUS",
            QueryKind::Feed => "FEED",
            QueryKind::Step => "STEP",
            QueryKind::DistanceToZero => "DISTANCE_TO_ZERO",
            QueryKind::DistanceToHome => "DISTANCE_TO_HOME",
            QueryKind::Travel => "TRAVEL",
            QueryKind::ProbeType => "PROBE_TYPE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "POSITION" => Some(QueryKind::Position),
            "STATUS" => Some(QueryKind::Status),
            "FEED" => Some(QueryKind::Feed),
            "STEP" => Some(QueryKind::Step),
            "DISTANCE_TO_ZERO" => Some(QueryKind::DistanceToZero),
            "DISTANCE_TO_HOME" => Some(QueryKind::DistanceToHome),
            "TRAVEL" => Some(QueryKind::Travel),
            "PROBE_TYPE" => Some(QueryKind::ProbeType),
            _ => None,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            QueryKind::Position => "Report position",
            QueryKind::Status => "Report machine status",
            QueryKind::Feed => "Report feed rate",
            QueryKind::Step => "Report step size",
            QueryKind::DistanceToZero => "Report distance to work zero",
            QueryKind::DistanceToHome => "Report distance to home",
            QueryKind::Travel => "Report travel from home",
            QueryKind::ProbeType => "Report probe type",
        }
    }
}

fn unit_suffix(units: UnitsPreference) -> &'static str {
    match units {
        UnitsPreference::Metric => "mm",
        UnitsPreference::Imperial => "in",
    }
}

/// "X-10 Y-5" from a millimetre vector, converted for display
fn axis_words(vector: &JogVector, units: UnitsPreference) -> String {
    vector
        .iter()
        .map(|(axis, mm)| format!("{}{}", axis, format_number(units.from_mm(*mm))))
        .collect::<Vec<_>>()
        .join(" ")
}

/// "X-10 Y-5" in millimetres for G-code
fn gcode_words(vector: &JogVector) -> String {
    vector
        .iter()
        .map(|(axis, mm)| format!("{}{}", axis, format_number(*mm)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn axes_label(axes: &[Axis]) -> String {
    match axes {
        [] => "all axes".to_string(),
        [axis] => format!("{} axis", axis),
        _ => format!("{} axes", axes.iter().map(|a| a.letter()).collect::<String>()),
    }
}

pub fn stop() -> Command {
    Command::new(CommandType::Stop, "Stop", "!")
}

pub fn resume() -> Command {
    Command::new(CommandType::Resume, "Resume", "~")
}

pub fn reset() -> Command {
    Command::new(CommandType::Reset, "Soft reset", "0x18")
}

pub fn unlock() -> Command {
    Command::new(CommandType::Unlock, "Unlock", "$X")
}

/// `$H` for all axes, `$HX` / `$HXY` for specific ones
pub fn home(axes: &[Axis]) -> Command {
    let letters: String = axes.iter().map(|a| a.letter()).collect();
    Command::new(
        CommandType::Home,
        format!("Home {}", axes_label(axes)),
        format!("$H{}", letters),
    )
}

/// Relative jog in the machine's own units; `vector` is in mm, `feed` in mm/min
pub fn jog(vector: JogVector, feed: f64, units: UnitsPreference) -> Command {
    let description = format!("Jog {} {}", axis_words(&vector, units), unit_suffix(units));
    let payload = format!("$J=G91 G21 {} F{}", gcode_words(&vector), format_number(feed));
    Command::new(CommandType::Jog, description, payload).with_jog_vector(vector)
}

/// Reverse of a previous jog
pub fn undo_jog(vector: &JogVector, feed: f64, units: UnitsPreference) -> Command {
    let reversed: JogVector = vector.iter().map(|(axis, mm)| (*axis, -mm)).collect();
    let description = format!(
        "Undo: jog {} {}",
        axis_words(&reversed, units),
        unit_suffix(units)
    );
    let payload = format!("$J=G91 G21 {} F{}", gcode_words(&reversed), format_number(feed));
    Command::new(CommandType::Undo, description, payload).with_jog_vector(reversed)
}

/// Rapid move to absolute coordinates (mm), in work or machine frame.
/// Coordinates are always millimeters, so the payload sets G21 like a jog does.
pub fn move_to(coords: &JogVector, machine_frame: bool, units: UnitsPreference) -> Command {
    let (frame, prefix) = if machine_frame {
        ("machine ", "G21 G53 G0")
    } else {
        ("", "G21 G90 G0")
    };
    Command::new(
        CommandType::Move,
        format!(
            "Move to {}{} {}",
            frame,
            axis_words(coords, units),
            unit_suffix(units)
        ),
        format!("{} {}", prefix, gcode_words(coords)),
    )
}

pub fn probe(axis: ProbeAxis, probe_type: ProbeType) -> Command {
    Command::new(
        CommandType::Probe,
        format!("Probe {} with the {}", axis.as_str(), probe_type.spoken_name()),
        format!("PROBE:{}:{}", axis.as_str(), probe_type.as_str()),
    )
}

/// Select work coordinate system `G<code>` (54..=59)
pub fn workspace(code: u8) -> Command {
    Command::new(
        CommandType::Workspace,
        format!("Switch to workspace G{}", code),
        format!("G{}", code),
    )
}

/// Set the current position as work zero. Only X, Y, Z, XY and all axes
/// have a zero instruction; any other pairing is blocked rather than widened.
pub fn zero(axes: &[Axis]) -> Command {
    let has = |axis| axes.contains(&axis);
    let (label, words) = match (has(Axis::X), has(Axis::Y), has(Axis::Z)) {
        (false, false, false) | (true, true, true) => ("all axes", "X0 Y0 Z0"),
        (true, false, false) => ("X axis", "X0"),
        (false, true, false) => ("Y axis", "Y0"),
        (false, false, true) => ("Z axis", "Z0"),
        (true, true, false) => ("XY axes", "X0 Y0"),
        _ => {
            return Command::blocked(format!(
                "Cannot zero {} together; zero X, Y, Z, XY or all axes",
                axes_label(axes)
            ))
        }
    };
    Command::new(
        CommandType::Zero,
        format!("Zero {}", label),
        format!("G10 L20 P0 {}", words),
    )
}

pub fn spindle_on(rpm: u32, counterclockwise: bool) -> Command {
    let (code, direction) = if counterclockwise {
        ("M4", "counterclockwise")
    } else {
        ("M3", "clockwise")
    };
    Command::new(
        CommandType::Spindle,
        format!("Spindle on {} at {} RPM", direction, rpm),
        format!("{} S{}", code, rpm),
    )
}

pub fn spindle_off() -> Command {
    Command::new(CommandType::Spindle, "Spindle off", "M5")
}

pub fn spindle_speed(rpm: u32) -> Command {
    Command::new(
        CommandType::Spindle,
        format!("Set spindle speed to {} RPM", rpm),
        format!("S{}", rpm),
    )
}

pub fn coolant_on() -> Command {
    Command::new(CommandType::Coolant, "Flood coolant on", "M8")
}

pub fn mist_on() -> Command {
    Command::new(CommandType::Coolant, "Mist coolant on", "M7")
}

pub fn coolant_off() -> Command {
    Command::new(CommandType::Coolant, "Coolant off", "M9")
}

pub fn tool_change(tool: u32) -> Command {
    Command::new(
        CommandType::ToolChange,
        format!("Change to tool {}", tool),
        format!("M6 T{}", tool),
    )
}

pub fn query(kind: QueryKind) -> Command {
    Command::new(
        CommandType::Query,
        kind.description(),
        format!("QUERY:{}", kind.as_str()),
    )
}

/// Feed setting; `feed_mm` in mm/min, described in display units
pub fn feed_setting(feed_mm: f64, units: UnitsPreference) -> Command {
    Command::new(
        CommandType::Setting,
        format!(
            "Set feed rate to {} {}",
            format_number(units.from_mm(feed_mm)),
            units.feed_name()
        ),
        format!("FEED:{}", format_number(feed_mm)),
    )
}

/// Step setting; `step_mm` in mm, described in display units
pub fn step_setting(step_mm: f64, units: UnitsPreference) -> Command {
    Command::new(
        CommandType::Setting,
        format!(
            "Set step size to {} {}",
            format_number(units.from_mm(step_mm)),
            units.length_name()
        ),
        format!("STEP:{}", format_number(step_mm)),
    )
}

pub fn probe_type_setting(probe_type: ProbeType) -> Command {
    Command::new(
        CommandType::Setting,
        format!("Use the {}", probe_type.spoken_name()),
        format!("PROBE_TYPE:{}", probe_type.as_str()),
    )
}

/// Wrap the last executed command for re-execution
pub fn repeat(last: &Command) -> Command {
    let mut cmd = Command::new(
        CommandType::Repeat,
        format!("Repeat: {}", last.description),
        last.payload.clone(),
    );
    cmd.jog_vector = last.jog_vector.clone();
    cmd
}
