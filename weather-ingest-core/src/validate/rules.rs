//! Second stage: invariant checks over the decoded fields.

use std::collections::BTreeSet;

use crate::model::GMT;

use super::Violation;
use super::structure::{
    Decoded, HUMIDITY, PRECIPITATION, TEMPERATURE, WEATHER_CODE, WIND_SPEED,
};

/// Inclusive plausibility bounds for one hourly metric.
struct RangeRule {
    field: &'static str,
    label: &'static str,
    unit: &'static str,
    min: f64,
    max: f64,
}

const TEMPERATURE_RULE: RangeRule =
    RangeRule { field: TEMPERATURE, label: "Temperature", unit: "°C", min: -60.0, max: 60.0 };
const HUMIDITY_RULE: RangeRule =
    RangeRule { field: HUMIDITY, label: "Humidity", unit: "%", min: 0.0, max: 100.0 };
const WEATHER_CODE_RULE: RangeRule =
    RangeRule { field: WEATHER_CODE, label: "Weather code", unit: "", min: 0.0, max: 99.0 };
const WIND_SPEED_RULE: RangeRule =
    RangeRule { field: WIND_SPEED, label: "Wind speed", unit: "km/h", min: 0.0, max: 400.0 };
const PRECIPITATION_RULE: RangeRule =
    RangeRule { field: PRECIPITATION, label: "Precipitation", unit: "mm", min: 0.0, max: 500.0 };

impl RangeRule {
    /// Reports only the first out-of-range value.
    fn check(&self, values: &[f64], violations: &mut Vec<Violation>) {
        let offending = values
            .iter()
            .enumerate()
            .find(|(_, v)| !(self.min..=self.max).contains(*v));

        if let Some((idx, value)) = offending {
            violations.push(Violation::new(
                format!("hourly.{}", self.field),
                format!(
                    "{} {}{} at index {} out of valid range ({} to {})",
                    self.label, value, self.unit, idx, self.min, self.max
                ),
            ));
        }
    }
}

/// Returns `false` when the series disagree on length.
pub(super) fn check_lengths(decoded: &Decoded, violations: &mut Vec<Violation>) -> bool {
    let lengths: BTreeSet<usize> = decoded.series_lengths().into_iter().map(|(_, l)| l).collect();

    if lengths.len() > 1 {
        let rendered: Vec<String> = lengths.iter().map(ToString::to_string).collect();
        violations.push(Violation::new(
            "hourly",
            format!("Mismatched array lengths: {{{}}}", rendered.join(", ")),
        ));
        return false;
    }
    true
}

pub(super) fn check_ranges(decoded: &Decoded, violations: &mut Vec<Violation>) {
    if let Some(values) = &decoded.temperature_2m {
        TEMPERATURE_RULE.check(values, violations);
    }
    if let Some(values) = &decoded.relative_humidity_2m {
        HUMIDITY_RULE.check(values, violations);
    }
    if let Some(codes) = &decoded.weather_code {
        let as_float: Vec<f64> = codes.iter().map(|c| *c as f64).collect();
        WEATHER_CODE_RULE.check(&as_float, violations);
    }
    if let Some(values) = &decoded.wind_speed_10m {
        WIND_SPEED_RULE.check(values, violations);
    }
    if let Some(values) = &decoded.precipitation {
        PRECIPITATION_RULE.check(values, violations);
    }
}

pub(super) fn check_envelope(decoded: &Decoded, violations: &mut Vec<Violation>) {
    if let Some(lat) = decoded.latitude {
        if !(-90.0..=90.0).contains(&lat) {
            violations.push(Violation::new(
                "latitude",
                format!("Latitude {lat} out of valid range (-90 to 90)"),
            ));
        }
    }
    if let Some(lon) = decoded.longitude {
        if !(-180.0..=180.0).contains(&lon) {
            violations.push(Violation::new(
                "longitude",
                format!("Longitude {lon} out of valid range (-180 to 180)"),
            ));
        }
    }

    for (field, value) in [
        ("timezone", &decoded.timezone),
        ("timezone_abbreviation", &decoded.timezone_abbreviation),
    ] {
        if let Some(tz) = value {
            if tz != GMT {
                violations.push(Violation::new(field, format!("Expected {GMT}, but got {tz}")));
            }
        }
    }
}
