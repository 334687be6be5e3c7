//! Triple-shot detection
//!
//! Surveyors often shoot the same station three times. When the last three
//! committed legs agree, the operator gets an extra cue; the data is never
//! touched.

use crate::core::constants::{TRIPLE_SHOT_ANGLE, TRIPLE_SHOT_DISTANCE};
use crate::core::Leg;

/// Two legs hit the same point
pub fn same_target(a: &Leg, b: &Leg) -> bool {
    (a.distance - b.distance).abs() <= TRIPLE_SHOT_DISTANCE
        && (a.direction() - b.direction()).norm() < TRIPLE_SHOT_ANGLE
}

/// True when the final three legs of `legs` pairwise agree, consecutive pairs
/// being compared. Fewer than three legs is never a triple.
pub fn is_triple_shot(legs: &[Leg]) -> bool {
    let Some(last) = legs.len().checked_sub(3).map(|start| &legs[start..]) else {
        return false;
    };
    last.windows(2).all(|pair| same_target(&pair[0], &pair[1]))
}
