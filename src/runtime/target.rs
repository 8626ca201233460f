//! Device targets and architecture families

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// GPU architecture family
///
/// Default heuristics tables are keyed by family, with per-target overrides.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuArch {
    /// First generation (T6xx, T7xx, T8xx)
    Midgard,
    /// Second generation (G71, G72, G51, G52, G76)
    Bifrost,
    /// Third generation (G77, G78)
    Valhall,
}

impl fmt::Display for GpuArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Midgard => "midgard",
            Self::Bifrost => "bifrost",
            Self::Valhall => "valhall",
        };
        f.write_str(name)
    }
}

/// Concrete GPU model a command queue submits to
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GpuTarget {
    /// Midgard T600 series
    T600,
    /// Midgard T700 series
    T700,
    /// Midgard T800 series
    T800,
    /// Bifrost G71
    G71,
    /// Bifrost G72
    G72,
    /// Bifrost G51
    G51,
    /// Bifrost G52
    G52,
    /// Bifrost G76
    G76,
    /// Valhall G77
    G77,
    /// Valhall G78
    G78,
}

impl GpuTarget {
    /// Every known target
    pub const ALL: [GpuTarget; 10] = [
        Self::T600,
        Self::T700,
        Self::T800,
        Self::G71,
        Self::G72,
        Self::G51,
        Self::G52,
        Self::G76,
        Self::G77,
        Self::G78,
    ];

    /// Architecture family of this target
    pub const fn arch(self) -> GpuArch {
        match self {
            Self::T600 | Self::T700 | Self::T800 => GpuArch::Midgard,
            Self::G71 | Self::G72 | Self::G51 | Self::G52 | Self::G76 => GpuArch::Bifrost,
            Self::G77 | Self::G78 => GpuArch::Valhall,
        }
    }

    /// Model name
    pub const fn name(self) -> &'static str {
        match self {
            Self::T600 => "T600",
            Self::T700 => "T700",
            Self::T800 => "T800",
            Self::G71 => "G71",
            Self::G72 => "G72",
            Self::G51 => "G51",
            Self::G52 => "G52",
            Self::G76 => "G76",
            Self::G77 => "G77",
            Self::G78 => "G78",
        }
    }
}

impl fmt::Display for GpuTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GpuTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::invalid_argument("target", format!("unknown GPU target '{s}'")))
    }
}
