//! Contracts for the collaborators around the voice pipeline
//!
//! The transport, the prober and the settings observer live outside this
//! crate. They are expressed as traits so the session can be driven by real
//! hardware, a console, or a test double.

use crate::command::executor::ExecutorEvent;
use crate::core::error::Result;
use crate::core::types::{ProbeAxis, ProbeId, ProbeType, UnitsPreference};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Line-oriented machine link. Fire and forget.
pub trait Transport: Send + Sync {
    fn send(&self, instruction: &str);
    fn send_cycle_start(&self);
    fn send_soft_reset(&self);
}

/// Latest known machine state
///
/// Positions are millimetres; feed is mm/min; step is mm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineStateSnapshot {
    pub machine_x: f64,
    pub machine_y: f64,
    pub machine_z: f64,
    pub work_x: f64,
    pub work_y: f64,
    pub work_z: f64,
    pub status: String,
    pub current_feed: f64,
    pub current_step: f64,
    pub units: UnitsPreference,
}

impl Default for MachineStateSnapshot {
    fn default() -> Self {
        Self {
            machine_x: 0.0,
            machine_y: 0.0,
            machine_z: 0.0,
            work_x: 0.0,
            work_y: 0.0,
            work_z: 0.0,
            status: "Idle".into(),
            current_feed: 1000.0,
            current_step: 1.0,
            units: UnitsPreference::Metric,
        }
    }
}

/// Partial state report; `None` fields keep their previous value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineUpdate {
    pub machine_x: Option<f64>,
    pub machine_y: Option<f64>,
    pub machine_z: Option<f64>,
    pub work_x: Option<f64>,
    pub work_y: Option<f64>,
    pub work_z: Option<f64>,
    pub status: Option<String>,
    pub current_feed: Option<f64>,
    pub current_step: Option<f64>,
    pub units: Option<UnitsPreference>,
}

impl MachineUpdate {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }
}

impl MachineStateSnapshot {
    pub fn apply(&mut self, update: MachineUpdate) {
        fn merge<T>(slot: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *slot = v;
            }
        }
        merge(&mut self.machine_x, update.machine_x);
        merge(&mut self.machine_y, update.machine_y);
        merge(&mut self.machine_z, update.machine_z);
        merge(&mut self.work_x, update.work_x);
        merge(&mut self.work_y, update.work_y);
        merge(&mut self.work_z, update.work_z);
        merge(&mut self.status, update.status);
        merge(&mut self.current_feed, update.current_feed);
        merge(&mut self.current_step, update.current_step);
        merge(&mut self.units, update.units);
    }

    /// grbl reports "Alarm" or "Alarm:1"
    pub fn is_alarm(&self) -> bool {
        self.status.to_ascii_lowercase().starts_with("alarm")
    }

    /// Straight-line distance from work zero, mm
    pub fn work_distance(&self) -> f64 {
        (self.work_x.powi(2) + self.work_y.powi(2) + self.work_z.powi(2)).sqrt()
    }

    /// Straight-line distance from machine home, mm
    pub fn machine_distance(&self) -> f64 {
        (self.machine_x.powi(2) + self.machine_y.powi(2) + self.machine_z.powi(2)).sqrt()
    }
}

/// Stock corner used by XY/XYZ probe cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeCorner {
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
}

/// Stock side used by single-axis probe cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeSide {
    Left,
    Right,
    Front,
    Back,
}

/// Parameters for one probe cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeParams {
    /// Bit diameter for a touch plate, ball diameter for a 3D probe (mm)
    pub tool_diameter: f64,
    pub plate_thickness: f64,
    /// Travel feed between touches, mm/min
    pub rapid_feed: f64,
    /// Seek feed while touching, mm/min
    pub probe_feed: f64,
    pub corner: Option<ProbeCorner>,
    pub side: Option<ProbeSide>,
}

impl ProbeParams {
    pub fn defaults(axis: ProbeAxis, probe_type: ProbeType) -> Self {
        let (tool_diameter, plate_thickness, rapid_feed, probe_feed) = match probe_type {
            ProbeType::Basic => (6.35, 15.0, 1000.0, 100.0),
            ProbeType::ThreeD => (2.0, 0.0, 500.0, 50.0),
        };
        let corner = match axis {
            ProbeAxis::XY | ProbeAxis::XYZ => Some(ProbeCorner::FrontLeft),
            _ => None,
        };
        let side = match axis {
            ProbeAxis::X => Some(ProbeSide::Left),
            ProbeAxis::Y => Some(ProbeSide::Front),
            _ => None,
        };
        Self {
            tool_diameter,
            plate_thickness,
            rapid_feed,
            probe_feed,
            corner,
            side,
        }
    }
}

/// One asynchronous probe call
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRequest {
    pub id: ProbeId,
    pub axis: ProbeAxis,
    pub probe_type: ProbeType,
    pub params: ProbeParams,
}

/// Progress channel handed to a prober, tagged with the request id
#[derive(Debug, Clone)]
pub struct ProbeReporter {
    id: ProbeId,
    events: UnboundedSender<ExecutorEvent>,
}

impl ProbeReporter {
    pub fn new(id: ProbeId, events: UnboundedSender<ExecutorEvent>) -> Self {
        Self { id, events }
    }

    pub fn id(&self) -> ProbeId {
        self.id
    }

    // A closed channel means the session is gone; nothing left to tell.
    pub fn started(&self) {
        let _ = self.events.send(ExecutorEvent::ProbeStarted { id: self.id });
    }

    pub fn succeeded(&self) {
        let _ = self.events.send(ExecutorEvent::ProbeSucceeded { id: self.id });
    }

    pub fn failed(&self, reason: impl Into<String>) {
        let _ = self.events.send(ExecutorEvent::ProbeFailed {
            id: self.id,
            reason: reason.into(),
        });
    }
}

/// Runs probe cycles. Calls `reporter.started()` once contact seeking
/// begins; success or failure is reported from the returned result.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, request: &ProbeRequest, reporter: &ProbeReporter) -> Result<()>;
}

/// Observer for session settings changed by voice
pub trait SettingsListener: Send + Sync {
    fn on_feed_changed(&self, feed_mm: f64);
    fn on_step_changed(&self, step_mm: f64);
    fn on_probe_type_changed(&self, probe_type: ProbeType);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_partial_update() {
        let mut snapshot = MachineStateSnapshot::default();
        snapshot.apply(MachineUpdate {
            work_x: Some(3.0),
            work_y: Some(4.0),
            ..MachineUpdate::default()
        });
        assert_eq!(snapshot.work_x, 3.0);
        assert_eq!(snapshot.work_z, 0.0);
        assert_eq!(snapshot.status, "Idle");
        assert!((snapshot.work_distance() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_alarm_detection() {
        let mut snapshot = MachineStateSnapshot::default();
        assert!(!snapshot.is_alarm());
        snapshot.apply(MachineUpdate::status("Alarm:1"));
        assert!(snapshot.is_alarm());
    }

    #[test]
    fn test_probe_defaults() {
        let basic = ProbeParams::defaults(ProbeAxis::XY, ProbeType::Basic);
        assert_eq!(basic.tool_diameter, 6.35);
        assert_eq!(basic.plate_thickness, 15.0);
        assert_eq!(basic.corner, Some(ProbeCorner::FrontLeft));
        assert_eq!(basic.side, None);

        let tip = ProbeParams::defaults(ProbeAxis::X, ProbeType::ThreeD);
        assert_eq!(tip.probe_feed, 50.0);
        assert_eq!(tip.side, Some(ProbeSide::Left));
        assert_eq!(ProbeParams::defaults(ProbeAxis::Y, ProbeType::Basic).side, Some(ProbeSide::Front));
    }

    #[test]
    fn test_reporter_tags_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let id = ProbeId::new();
        let reporter = ProbeReporter::new(id, tx);
        reporter.started();
        reporter.failed("no contact");
        assert_eq!(rx.try_recv().unwrap(), ExecutorEvent::ProbeStarted { id });
        assert_eq!(
            rx.try_recv().unwrap(),
            ExecutorEvent::ProbeFailed {
                id,
                reason: "no contact".into()
            }
        );
    }
}
