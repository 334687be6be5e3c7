//! Similar-shot grouping
//!
//! Operators are asked to take several shots at one fixed target while
//! rolling the instrument. Those runs show up as contiguous samples whose
//! directions agree; everything else is coverage for the ellipsoid fit.

use std::ops::Range;

use nalgebra::Vector3;

/// Contiguous sample range `[start, end)` judged to hit one target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShotGroup {
    pub start: usize,
    pub end: usize,
}

impl ShotGroup {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Scan `directions` left to right for maximal runs whose members are all
/// within `tolerance` radians of each other.
///
/// A run ends at the first shot that disagrees with any member; that shot
/// starts the next candidate. Undefined directions break runs. Runs shorter
/// than `min_len` are discarded.
pub fn find_runs(directions: &[Option<Vector3<f64>>], tolerance: f64, min_len: usize) -> Vec<ShotGroup> {
    let mut runs = Vec::new();
    let mut start = 0;

    let close = |start: usize, end: usize, runs: &mut Vec<ShotGroup>| {
        if end - start >= min_len.max(1) {
            runs.push(ShotGroup { start, end });
        }
    };

    for i in 0..directions.len() {
        let Some(current) = directions[i] else {
            close(start, i, &mut runs);
            start = i + 1;
            continue;
        };
        let fits = directions[start..i]
            .iter()
            .all(|member| member.map_or(false, |m| m.angle(&current) < tolerance));
        if !fits {
            close(start, i, &mut runs);
            start = i;
        }
    }
    close(start, directions.len(), &mut runs);
    runs
}
