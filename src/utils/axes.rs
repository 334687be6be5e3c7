//! Sensor axis remapping
//!
//! Each sensor chip is mounted in its own orientation on the board. A map
//! like `"-Y-X+Z"` says which raw axis, with which sign, becomes device X, Y
//! and Z respectively.

use std::fmt;
use std::str::FromStr;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AxisMapError {
    #[error("axis map '{0}' must be three signed axes such as +X+Y+Z")]
    Malformed(String),
    #[error("axis map '{0}' uses an axis more than once")]
    Repeated(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AxisMap {
    /// Source axis index and sign for each device axis
    axes: [(usize, i8); 3],
}

impl AxisMap {
    pub const IDENTITY: AxisMap = AxisMap { axes: [(0, 1), (1, 1), (2, 1)] };

    pub fn apply(&self, raw: &Vector3<f64>) -> Vector3<f64> {
        Vector3::from_fn(|i, _| {
            let (source, sign) = self.axes[i];
            f64::from(sign) * raw[source]
        })
    }
}

impl Default for AxisMap {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl FromStr for AxisMap {
    type Err = AxisMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || AxisMapError::Malformed(s.to_string());
        let chars: Vec<char> = s.trim().chars().collect();
        if chars.len() != 6 {
            return Err(malformed());
        }

        let mut axes = [(0usize, 1i8); 3];
        let mut seen = [false; 3];
        for (slot, pair) in axes.iter_mut().zip(chars.chunks(2)) {
            let sign = match pair[0] {
                '+' => 1,
                '-' => -1,
                _ => return Err(malformed()),
            };
            let source = match pair[1].to_ascii_uppercase() {
                'X' => 0,
                'Y' => 1,
                'Z' => 2,
                _ => return Err(malformed()),
            };
            if seen[source] {
                return Err(AxisMapError::Repeated(s.to_string()));
            }
            seen[source] = true;
            *slot = (source, sign);
        }
        Ok(Self { axes })
    }
}

impl TryFrom<String> for AxisMap {
    type Error = AxisMapError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AxisMap> for String {
    fn from(map: AxisMap) -> Self {
        map.to_string()
    }
}

impl fmt::Display for AxisMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (source, sign) in self.axes {
            let sign = if sign < 0 { '-' } else { '+' };
            write!(f, "{}{}", sign, ['X', 'Y', 'Z'][source])?;
        }
        Ok(())
    }
}
