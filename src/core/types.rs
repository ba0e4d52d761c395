//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Millimetres per inch
pub const MM_PER_INCH: f64 = 25.4;

/// Machine axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn letter(&self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'x' => Some(Axis::X),
            'y' => Some(Axis::Y),
            'z' => Some(Axis::Z),
            _ => None,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Relative motion: signed distance (mm) per axis, ordered X, Y, Z
pub type JogVector = BTreeMap<Axis, f64>;

/// Display unit preference for spoken input and answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitsPreference {
    #[default]
    Metric,
    Imperial,
}

impl UnitsPreference {
    /// Convert a length spoken in display units to millimetres
    pub fn to_mm(&self, value: f64) -> f64 {
        match self {
            UnitsPreference::Metric => value,
            UnitsPreference::Imperial => value * MM_PER_INCH,
        }
    }

    /// Convert millimetres to display units
    pub fn from_mm(&self, value: f64) -> f64 {
        match self {
            UnitsPreference::Metric => value,
            UnitsPreference::Imperial => value / MM_PER_INCH,
        }
    }

    pub fn length_name(&self) -> &'static str {
        match self {
            UnitsPreference::Metric => "millimeters",
            UnitsPreference::Imperial => "inches",
        }
    }

    pub fn feed_name(&self) -> &'static str {
        match self {
            UnitsPreference::Metric => "millimeters per minute",
            UnitsPreference::Imperial => "inches per minute",
        }
    }
}

/// Where the machine homes, which decides the sign of forward/back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HomeLocation {
    /// Home switches at the back of the machine (Y max)
    #[default]
    Back,
    /// Home switches at the front of the machine (Y min)
    Front,
}

impl HomeLocation {
    /// Sign applied to Y when the operator says "forward"
    pub fn forward_sign(&self) -> f64 {
        match self {
            HomeLocation::Back => -1.0,
            HomeLocation::Front => 1.0,
        }
    }
}

/// Kind of probe attached to the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProbeType {
    /// Conductive touch plate used with the cutting bit
    #[default]
    #[serde(rename = "basic")]
    Basic,
    /// 3D touch probe with a ruby tip
    #[serde(rename = "3d")]
    ThreeD,
}

impl ProbeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeType::Basic => "basic",
            ProbeType::ThreeD => "3d",
        }
    }

    pub fn spoken_name(&self) -> &'static str {
        match self {
            ProbeType::Basic => "touch plate",
            ProbeType::ThreeD => "3D probe",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "basic" | "standard" | "plate" | "touch plate" => Some(ProbeType::Basic),
            "3d" | "3 d" | "three d" | "touch probe" => Some(ProbeType::ThreeD),
            _ => None,
        }
    }
}

/// Axis combination targeted by a probe cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbeAxis {
    X,
    Y,
    Z,
    XY,
    XYZ,
    Center,
}

impl ProbeAxis {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeAxis::X => "X",
            ProbeAxis::Y => "Y",
            ProbeAxis::Z => "Z",
            ProbeAxis::XY => "XY",
            ProbeAxis::XYZ => "XYZ",
            ProbeAxis::Center => "CENTER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "X" => Some(ProbeAxis::X),
            "Y" => Some(ProbeAxis::Y),
            "Z" => Some(ProbeAxis::Z),
            "XY" => Some(ProbeAxis::XY),
            "XYZ" => Some(ProbeAxis::XYZ),
            "CENTER" => Some(ProbeAxis::Center),
            _ => None,
        }
    }
}

/// Identifier tying asynchronous probe progress back to the request that started it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProbeId(pub Uuid);

impl ProbeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProbeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Format a number for G-code and speech: up to three decimals, no trailing zeros
pub fn format_number(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    // avoid "-0"
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    let s = format!("{:.3}", rounded);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number_trims() {
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(-5.0), "-5");
        assert_eq!(format_number(0.1), "0.1");
        assert_eq!(format_number(25.4), "25.4");
        assert_eq!(format_number(-0.0001), "0");
        assert_eq!(format_number(1.23456), "1.235");
    }

    #[test]
    fn test_units_conversion() {
        assert_eq!(UnitsPreference::Imperial.to_mm(1.0), 25.4);
        assert_eq!(UnitsPreference::Metric.to_mm(3.0), 3.0);
        assert!((UnitsPreference::Imperial.from_mm(25.4) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_forward_sign_follows_home() {
        assert_eq!(HomeLocation::Back.forward_sign(), -1.0);
        assert_eq!(HomeLocation::Front.forward_sign(), 1.0);
    }

    #[test]
    fn test_probe_type_parse_and_serde() {
        assert_eq!(ProbeType::parse("3 d"), Some(ProbeType::ThreeD));
        assert_eq!(ProbeType::parse("touch plate"), Some(ProbeType::Basic));
        assert_eq!(ProbeType::parse("laser"), None);
        assert_eq!(serde_json::to_string(&ProbeType::ThreeD).unwrap(), "\"3d\"");
    }

    #[test]
    fn test_axis_ordering_is_xyz() {
        let mut v = JogVector::new();
        v.insert(Axis::Z, 1.0);
        v.insert(Axis::X, 2.0);
        let axes: Vec<_> = v.keys().copied().collect();
        assert_eq!(axes, vec![Axis::X, Axis::Z]);
    }
}
