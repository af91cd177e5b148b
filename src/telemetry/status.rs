//! Water-level severity classification.
//!
//! [`STATUS_BANDS`] is the one threshold table in the crate. Charts, the
//! reconciler and the history aggregator all classify through [`classify`],
//! and the HTTP layer serves the same table to UI consumers so nothing keeps
//! its own copy of the 100/150/200 cm boundaries.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Lower bound of the `warning` band, in centimeters.
pub const WARNING_THRESHOLD_CM: f64 = 100.0;
/// Lower bound of the `siaga` band, in centimeters.
pub const SIAGA_THRESHOLD_CM: f64 = 150.0;
/// Lower bound of the `danger` band, in centimeters.
pub const DANGER_THRESHOLD_CM: f64 = 200.0;

/// Severity levels, ordered `normal < warning < siaga < danger`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Normal,
    Warning,
    Siaga,
    Danger,
}

impl StatusLevel {
    /// All levels in ascending severity.
    pub const ALL: [StatusLevel; 4] = [
        StatusLevel::Normal,
        StatusLevel::Warning,
        StatusLevel::Siaga,
        StatusLevel::Danger,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Siaga => "siaga",
            Self::Danger => "danger",
        }
    }

    /// Human-facing label shown on dashboards.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Warning => "Waspada",
            Self::Siaga => "Siaga",
            Self::Danger => "Bahaya",
        }
    }
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown status level: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for StatusLevel {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "warning" | "waspada" => Ok(Self::Warning),
            "siaga" => Ok(Self::Siaga),
            "danger" | "bahaya" => Ok(Self::Danger),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// One row of the threshold table: `lower_cm <= level < upper_cm`.
///
/// `None` bounds are open; the bottom band has no lower bound and the top
/// band has no upper bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusBand {
    pub level: StatusLevel,
    pub lower_cm: Option<f64>,
    pub upper_cm: Option<f64>,
}

impl StatusBand {
    #[must_use]
    pub fn contains(&self, level_cm: f64) -> bool {
        self.lower_cm.is_none_or(|lo| level_cm >= lo) && self.upper_cm.is_none_or(|hi| level_cm < hi)
    }
}

pub const STATUS_BANDS: [StatusBand; 4] = [
    StatusBand {
        level: StatusLevel::Normal,
        lower_cm: None,
        upper_cm: Some(WARNING_THRESHOLD_CM),
    },
    StatusBand {
        level: StatusLevel::Warning,
        lower_cm: Some(WARNING_THRESHOLD_CM),
        upper_cm: Some(SIAGA_THRESHOLD_CM),
    },
    StatusBand {
        level: StatusLevel::Siaga,
        lower_cm: Some(SIAGA_THRESHOLD_CM),
        upper_cm: Some(DANGER_THRESHOLD_CM),
    },
    StatusBand {
        level: StatusLevel::Danger,
        lower_cm: Some(DANGER_THRESHOLD_CM),
        upper_cm: None,
    },
];

/// Classify a water level (cm) into its severity band.
///
/// Total over `f64`: anything that is not at or above a lower bound,
/// including `NaN`, falls into `normal`.
#[must_use]
pub fn classify(level_cm: f64) -> StatusLevel {
    STATUS_BANDS
        .iter()
        .rev()
        .find(|band| band.lower_cm.is_none_or(|lo| level_cm >= lo))
        .map_or(StatusLevel::Normal, |band| band.level)
}

/// Deserialize an optional status, mapping unknown tags to `None`.
///
/// Upstream status tags are advisory (they get recomputed), so a bad tag must
/// not poison the rest of the row.
pub fn lenient_status<'de, D>(deserializer: D) -> Result<Option<StatusLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}
