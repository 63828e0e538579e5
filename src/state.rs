use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

/// Categorical road condition assigned to a measured point.
///
/// Ordering follows [`RoadState::priority`], so `max` yields the worse state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RoadState {
    NotMeasured,
    VeryGood,
    Good,
    Fair,
    Poor,
    VeryPoor,
}

impl RoadState {
    pub const ALL: [RoadState; 6] = [
        RoadState::VeryGood,
        RoadState::Good,
        RoadState::Fair,
        RoadState::Poor,
        RoadState::VeryPoor,
        RoadState::NotMeasured,
    ];

    /// Parse a label as stored in the database or a RoadLab export.
    ///
    /// Labels are trimmed and upper-cased. Unknown labels are treated as not measured.
    pub fn parse(label: &str) -> Self {
        let normalized = label.trim().to_uppercase();
        match Self::from_normalized(&normalized) {
            Some(state) => state,
            None => {
                warn!("Unknown road state label {:?}, treating as NOT MEASURED", label);
                RoadState::NotMeasured
            }
        }
    }

    fn from_normalized(label: &str) -> Option<Self> {
        Some(match label {
            "VERY GOOD" => RoadState::VeryGood,
            "GOOD" => RoadState::Good,
            "FAIR" => RoadState::Fair,
            "POOR" => RoadState::Poor,
            "VERY POOR" => RoadState::VeryPoor,
            "NOT MEASURED" | "" => RoadState::NotMeasured,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoadState::VeryGood => "VERY GOOD",
            RoadState::Good => "GOOD",
            RoadState::Fair => "FAIR",
            RoadState::Poor => "POOR",
            RoadState::VeryPoor => "VERY POOR",
            RoadState::NotMeasured => "NOT MEASURED",
        }
    }

    /// Higher is worse
    pub fn priority(&self) -> u8 {
        match self {
            RoadState::NotMeasured => 0,
            RoadState::VeryGood => 1,
            RoadState::Good => 2,
            RoadState::Fair => 3,
            RoadState::Poor => 4,
            RoadState::VeryPoor => 5,
        }
    }

    /// The worse of two states; ties keep `self`
    pub fn worse(self, other: RoadState) -> RoadState {
        if self.priority() >= other.priority() {
            self
        } else {
            other
        }
    }

    /// Line color on the condition map
    pub fn color(&self) -> &'static str {
        match self {
            RoadState::VeryGood => "green",
            RoadState::Good => "lightgreen",
            RoadState::Fair => "orange",
            RoadState::Poor => "red",
            RoadState::VeryPoor => "darkred",
            RoadState::NotMeasured => "gray",
        }
    }

    /// Line color on the matched track viewer
    pub fn track_color(&self) -> &'static str {
        match self {
            RoadState::Good => "lime",
            other => other.color(),
        }
    }
}

/// Fold an optional running state with the next one
pub fn choose_worse(current: Option<RoadState>, next: Option<RoadState>) -> Option<RoadState> {
    match (current, next) {
        (None, s) | (s, None) => s,
        (Some(a), Some(b)) => Some(a.worse(b)),
    }
}

impl fmt::Display for RoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for RoadState {
    fn from(value: String) -> Self {
        RoadState::parse(&value)
    }
}

impl From<&str> for RoadState {
    fn from(value: &str) -> Self {
        RoadState::parse(value)
    }
}

impl From<RoadState> for String {
    fn from(value: RoadState) -> Self {
        value.as_str().to_string()
    }
}
