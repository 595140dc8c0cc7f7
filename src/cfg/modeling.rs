#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

fn default_sv_clock() -> bool {
    true
}

fn default_group_delay() -> bool {
    true
}

fn default_earth_rot() -> bool {
    true
}

fn default_relativistic_clock() -> bool {
    true
}

/// Physical modeling applied to raw pseudo ranges
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Modeling {
    /// Compensate for onboard clock offset to system time (+/- 100km)
    #[cfg_attr(feature = "serde", serde(default = "default_sv_clock"))]
    pub sv_clock_bias: bool,
    /// Compensate for onboard circuitry delay (+/- 1m)
    #[cfg_attr(feature = "serde", serde(default = "default_group_delay"))]
    pub sv_total_group_delay: bool,
    /// Compensate for relativistic effect on onboard clock (+/- 1m)
    #[cfg_attr(feature = "serde", serde(default = "default_relativistic_clock"))]
    pub relativistic_clock_bias: bool,
    /// Compensate for Earth rotation during signal propagation
    /// (static +5/+10m eastern error).
    #[cfg_attr(feature = "serde", serde(default = "default_earth_rot"))]
    pub earth_rotation: bool,
}

impl Default for Modeling {
    fn default() -> Self {
        Self {
            sv_clock_bias: default_sv_clock(),
            sv_total_group_delay: default_group_delay(),
            relativistic_clock_bias: default_relativistic_clock(),
            earth_rotation: default_earth_rot(),
        }
    }
}
