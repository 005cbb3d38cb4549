//! Vehicle sides and photo phases

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One vehicle facet, assessed independently
///
/// Ordering (front, rear, left, right) is the order sides are processed and
/// reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Front,
    Rear,
    Left,
    Right,
}

impl Side {
    pub const ALL: [Side; 4] = [Side::Front, Side::Rear, Side::Left, Side::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Front => "front",
            Side::Rear => "rear",
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "front" => Ok(Side::Front),
            "rear" => Ok(Side::Rear),
            "left" => Ok(Side::Left),
            "right" => Ok(Side::Right),
            other => Err(format!("unknown side: {}", other)),
        }
    }
}

/// When a photo was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImagePhase {
    Pickup,
    Return,
}

impl ImagePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImagePhase::Pickup => "pickup",
            ImagePhase::Return => "return",
        }
    }
}

impl fmt::Display for ImagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImagePhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pickup" => Ok(ImagePhase::Pickup),
            "return" => Ok(ImagePhase::Return),
            other => Err(format!("unknown phase: {}", other)),
        }
    }
}

/// Parse an image name of the form `<side>-<phase>` (e.g. `front-pickup`)
pub fn parse_side_phase(name: &str) -> Option<(Side, ImagePhase)> {
    let (side, phase) = name.split_once('-')?;
    Some((side.parse().ok()?, phase.parse().ok()?))
}
