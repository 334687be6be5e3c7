//! Leg output formatting
//!
//! Turns committed legs into the strings handed to the screen collaborator
//! and the rows written to the trip log, honouring the configured units.

use serde::{Deserialize, Serialize};

use crate::core::Leg;

const FEET_PER_METRE: f64 = 3.280_84;
const GRADS_PER_DEGREE: f64 = 400.0 / 360.0;

/// Distance display unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    #[default]
    Metric,
    Imperial,
}

impl DistanceUnit {
    pub fn convert(self, metres: f64) -> f64 {
        match self {
            DistanceUnit::Metric => metres,
            DistanceUnit::Imperial => metres * FEET_PER_METRE,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            DistanceUnit::Metric => "m",
            DistanceUnit::Imperial => "ft",
        }
    }

    pub fn next(self) -> Self {
        match self {
            DistanceUnit::Metric => DistanceUnit::Imperial,
            DistanceUnit::Imperial => DistanceUnit::Metric,
        }
    }
}

/// Angle display unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AngleUnit {
    #[default]
    Degrees,
    Grads,
}

impl AngleUnit {
    pub fn convert(self, degrees: f64) -> f64 {
        match self {
            AngleUnit::Degrees => degrees,
            AngleUnit::Grads => degrees * GRADS_PER_DEGREE,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            AngleUnit::Degrees => "°",
            AngleUnit::Grads => "g",
        }
    }

    pub fn next(self) -> Self {
        match self {
            AngleUnit::Degrees => AngleUnit::Grads,
            AngleUnit::Grads => AngleUnit::Degrees,
        }
    }
}

pub fn format_distance(metres: f64, unit: DistanceUnit, decimals: usize) -> String {
    format!("{:.*}{}", decimals, unit.convert(metres), unit.suffix())
}

pub fn format_azimuth(degrees: f64, unit: AngleUnit, decimals: usize) -> String {
    format!("{:.*}{}", decimals, unit.convert(degrees), unit.suffix())
}

/// Inclinations always carry a sign so up and down shots are unmistakable
pub fn format_inclination(degrees: f64, unit: AngleUnit, decimals: usize) -> String {
    format!("{:+.*}{}", decimals, unit.convert(degrees), unit.suffix())
}

/// Pre-formatted leg for the screen collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct LegView {
    pub azimuth: String,
    pub inclination: String,
    pub distance: String,
    /// Review cursor, `-1` being the newest leg
    pub index: isize,
    /// Last three legs hit the same target
    pub triple: bool,
}

impl LegView {
    pub fn new(leg: &Leg, index: isize, units: DistanceUnit, angles: AngleUnit) -> Self {
        Self {
            azimuth: format_azimuth(leg.azimuth, angles, 1),
            inclination: format_inclination(leg.inclination, angles, 1),
            distance: format_distance(leg.distance, units, 2),
            index,
            triple: false,
        }
    }

    pub fn with_triple(mut self, triple: bool) -> Self {
        self.triple = triple;
        self
    }
}

/// CSV rows for the trip log
#[derive(Debug, Clone, Copy, Default)]
pub struct TripFormatter {
    pub units: DistanceUnit,
    pub angles: AngleUnit,
}

impl TripFormatter {
    pub fn new(units: DistanceUnit, angles: AngleUnit) -> Self {
        Self { units, angles }
    }

    pub fn header(&self) -> &'static str {
        "Distance, Compass, Clino"
    }

    /// One row, numbers only, no unit suffixes
    pub fn format_row(&self, leg: &Leg) -> String {
        format!(
            "{:.1}, {:.1}, {:.3}",
            self.units.convert(leg.distance),
            self.angles.convert(leg.azimuth),
            self.angles.convert(leg.inclination)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_degrees() {
        assert_eq!(format_distance(12.346, DistanceUnit::Metric, 2), "12.35m");
        assert_eq!(format_azimuth(359.94, AngleUnit::Degrees, 1), "359.9°");
        assert_eq!(format_inclination(12.0, AngleUnit::Degrees, 1), "+12.0°");
        assert_eq!(format_inclination(-3.24, AngleUnit::Degrees, 1), "-3.2°");
    }

    #[test]
    fn test_imperial_grads() {
        assert_eq!(format_distance(10.0, DistanceUnit::Imperial, 1), "32.8ft");
        assert_eq!(format_azimuth(90.0, AngleUnit::Grads, 1), "100.0g");
    }

    #[test]
    fn test_trip_row_uses_units_without_suffix() {
        let leg = Leg::new(90.0, -12.5, 10.0);
        let metric = TripFormatter::default();
        assert_eq!(metric.header(), "Distance, Compass, Clino");
        assert_eq!(metric.format_row(&leg), "10.0, 90.0, -12.500");

        let imperial = TripFormatter::new(DistanceUnit::Imperial, AngleUnit::Grads);
        assert_eq!(imperial.format_row(&leg), "32.8, 100.0, -13.889");
    }

    #[test]
    fn test_leg_view() {
        let view = LegView::new(&Leg::new(45.0, 1.0, 3.0), -2, DistanceUnit::Metric, AngleUnit::Degrees)
            .with_triple(true);
        assert_eq!(view.azimuth, "45.0°");
        assert_eq!(view.distance, "3.00m");
        assert_eq!(view.index, -2);
        assert!(view.triple);
    }
}
