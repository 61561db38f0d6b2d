//! Units of angle, distance and time
//!
//! Hosts store angles in radians, distances in centimeters and times in
//! seconds. Every unit here converts to and from those.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

use void_host::Dimension;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AngleUnit {
    Radians,
    Degrees,
    AngularMinutes,
    AngularSeconds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceUnit {
    Millimeters,
    Centimeters,
    Meters,
    Kilometers,
    Inches,
    Feet,
    Yards,
    Miles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    /// 24 frames per second
    Film,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    Angle(AngleUnit),
    Distance(DistanceUnit),
    Time(TimeUnit),
}

impl Unit {
    pub const RADIANS: Unit = Unit::Angle(AngleUnit::Radians);
    pub const DEGREES: Unit = Unit::Angle(AngleUnit::Degrees);
    pub const MILLIMETERS: Unit = Unit::Distance(DistanceUnit::Millimeters);
    pub const CENTIMETERS: Unit = Unit::Distance(DistanceUnit::Centimeters);
    pub const METERS: Unit = Unit::Distance(DistanceUnit::Meters);
    pub const INCHES: Unit = Unit::Distance(DistanceUnit::Inches);
    pub const SECONDS: Unit = Unit::Time(TimeUnit::Seconds);
    pub const MILLISECONDS: Unit = Unit::Time(TimeUnit::Milliseconds);
    pub const FILM: Unit = Unit::Time(TimeUnit::Film);

    pub fn dimension(self) -> Dimension {
        match self {
            Unit::Angle(_) => Dimension::Angle,
            Unit::Distance(_) => Dimension::Distance,
            Unit::Time(_) => Dimension::Time,
        }
    }

    /// Size of one of this unit in host storage units
    pub fn factor(self) -> f64 {
        match self {
            Unit::Angle(unit) => match unit {
                AngleUnit::Radians => 1.0,
                AngleUnit::Degrees => PI / 180.0,
                AngleUnit::AngularMinutes => PI / (180.0 * 60.0),
                AngleUnit::AngularSeconds => PI / (180.0 * 3600.0),
            },
            Unit::Distance(unit) => match unit {
                DistanceUnit::Millimeters => 0.1,
                DistanceUnit::Centimeters => 1.0,
                DistanceUnit::Meters => 100.0,
                DistanceUnit::Kilometers => 100_000.0,
                DistanceUnit::Inches => 2.54,
                DistanceUnit::Feet => 30.48,
                DistanceUnit::Yards => 91.44,
                DistanceUnit::Miles => 160_934.4,
            },
            Unit::Time(unit) => match unit {
                TimeUnit::Milliseconds => 0.001,
                TimeUnit::Seconds => 1.0,
                TimeUnit::Minutes => 60.0,
                TimeUnit::Hours => 3600.0,
                TimeUnit::Film => 1.0 / 24.0,
            },
        }
    }

    pub fn to_storage(self, value: f64) -> f64 {
        value * self.factor()
    }

    pub fn from_storage(self, value: f64) -> f64 {
        value / self.factor()
    }

    /// Storage unit of a dimension
    pub fn storage(dimension: Dimension) -> Unit {
        match dimension {
            Dimension::Angle => Unit::RADIANS,
            Dimension::Distance => Unit::CENTIMETERS,
            Dimension::Time => Unit::SECONDS,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Angle(u) => write!(f, "{u:?}"),
            Unit::Distance(u) => write!(f, "{u:?}"),
            Unit::Time(u) => write!(f, "{u:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_angle_conversion() {
        assert!(close(Unit::DEGREES.to_storage(180.0), PI));
        assert!(close(Unit::DEGREES.from_storage(PI / 2.0), 90.0));
        assert!(close(Unit::Angle(AngleUnit::AngularMinutes).from_storage(Unit::DEGREES.to_storage(1.0)), 60.0));
    }

    #[test]
    fn test_distance_conversion() {
        assert!(close(Unit::METERS.to_storage(1.5), 150.0));
        assert!(close(Unit::INCHES.from_storage(2.54), 1.0));
        assert!(close(Unit::MILLIMETERS.from_storage(1.0), 10.0));
    }

    #[test]
    fn test_time_conversion() {
        assert!(close(Unit::FILM.to_storage(24.0), 1.0));
        assert!(close(Unit::MILLISECONDS.from_storage(0.5), 500.0));
    }

    #[test]
    fn test_storage_units() {
        assert_eq!(Unit::storage(Dimension::Angle), Unit::RADIANS);
        assert_eq!(Unit::METERS.dimension(), Dimension::Distance);
    }
}
