//! First stage: pull typed fields out of the untyped payload.
//!
//! Every problem is recorded; a field that fails to decode is left as `None`
//! so later checks can still run against the fields that did decode.

use serde_json::{Map, Value};

use crate::model::{HourlySeries, HourlyUnits, ValidatedObservationSet};

use super::Violation;

pub(super) const TIME: &str = "time";
pub(super) const TEMPERATURE: &str = "temperature_2m";
pub(super) const HUMIDITY: &str = "relative_humidity_2m";
pub(super) const WEATHER_CODE: &str = "weather_code";
pub(super) const WIND_SPEED: &str = "wind_speed_10m";
pub(super) const PRECIPITATION: &str = "precipitation";

pub(super) const SERIES: [&str; 6] =
    [TIME, TEMPERATURE, HUMIDITY, WEATHER_CODE, WIND_SPEED, PRECIPITATION];

#[derive(Debug, Default)]
pub(super) struct Decoded {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub generationtime_ms: Option<f64>,
    pub utc_offset_seconds: Option<f64>,
    pub timezone: Option<String>,
    pub timezone_abbreviation: Option<String>,
    pub elevation: Option<f64>,
    pub units: Option<HourlyUnits>,
    pub time: Option<Vec<String>>,
    pub temperature_2m: Option<Vec<f64>>,
    pub relative_humidity_2m: Option<Vec<f64>>,
    pub weather_code: Option<Vec<i64>>,
    pub wind_speed_10m: Option<Vec<f64>>,
    pub precipitation: Option<Vec<f64>>,
}

impl Decoded {
    /// Lengths of the series that decoded, tagged with their names.
    pub fn series_lengths(&self) -> Vec<(&'static str, usize)> {
        [
            (TIME, self.time.as_ref().map(Vec::len)),
            (TEMPERATURE, self.temperature_2m.as_ref().map(Vec::len)),
            (HUMIDITY, self.relative_humidity_2m.as_ref().map(Vec::len)),
            (WEATHER_CODE, self.weather_code.as_ref().map(Vec::len)),
            (WIND_SPEED, self.wind_speed_10m.as_ref().map(Vec::len)),
            (PRECIPITATION, self.precipitation.as_ref().map(Vec::len)),
        ]
        .into_iter()
        .filter_map(|(name, len)| len.map(|l| (name, l)))
        .collect()
    }

    /// Builds the model only when every field decoded.
    pub fn into_model(self) -> Option<ValidatedObservationSet> {
        Some(ValidatedObservationSet {
            latitude: self.latitude?,
            longitude: self.longitude?,
            generationtime_ms: self.generationtime_ms?,
            utc_offset_seconds: self.utc_offset_seconds?,
            timezone: self.timezone?,
            timezone_abbreviation: self.timezone_abbreviation?,
            elevation: self.elevation?,
            hourly_units: self.units?,
            hourly: HourlySeries {
                time: self.time?,
                temperature_2m: self.temperature_2m?,
                relative_humidity_2m: self.relative_humidity_2m?,
                weather_code: self.weather_code?,
                wind_speed_10m: self.wind_speed_10m?,
                precipitation: self.precipitation?,
            },
        })
    }
}

pub(super) fn decode(raw: &Value, violations: &mut Vec<Violation>) -> Decoded {
    let Some(root) = raw.as_object() else {
        violations.push(Violation::new("$", format!("expected an object, got {}", kind(raw))));
        return Decoded::default();
    };

    let mut d = Decoded {
        latitude: number(root, "", "latitude", violations),
        longitude: number(root, "", "longitude", violations),
        generationtime_ms: number(root, "", "generationtime_ms", violations),
        utc_offset_seconds: number(root, "", "utc_offset_seconds", violations),
        timezone: string(root, "", "timezone", violations),
        timezone_abbreviation: string(root, "", "timezone_abbreviation", violations),
        elevation: number(root, "", "elevation", violations),
        ..Decoded::default()
    };

    if let Some(units) = object(root, "hourly_units", violations) {
        let mut get = |name: &str| string(units, "hourly_units.", name, violations);
        let fields = SERIES.map(&mut get);
        if let [Some(t), Some(temp), Some(hum), Some(code), Some(wind), Some(prec)] = fields {
            d.units = Some(HourlyUnits {
                time: t,
                temperature_2m: temp,
                relative_humidity_2m: hum,
                weather_code: code,
                wind_speed_10m: wind,
                precipitation: prec,
            });
        }
    }

    if let Some(hourly) = object(root, "hourly", violations) {
        d.time = series(hourly, TIME, violations, |v| v.as_str().map(str::to_owned), "a string");
        d.temperature_2m = series(hourly, TEMPERATURE, violations, Value::as_f64, "a number");
        d.relative_humidity_2m = series(hourly, HUMIDITY, violations, Value::as_f64, "a number");
        d.weather_code = series(hourly, WEATHER_CODE, violations, as_integer, "an integer");
        d.wind_speed_10m = series(hourly, WIND_SPEED, violations, Value::as_f64, "a number");
        d.precipitation = series(hourly, PRECIPITATION, violations, Value::as_f64, "a number");
    }

    d
}

fn field<'a>(
    obj: &'a Map<String, Value>,
    prefix: &str,
    name: &str,
    violations: &mut Vec<Violation>,
) -> Option<&'a Value> {
    let value = obj.get(name);
    if value.is_none() {
        violations.push(Violation::new(format!("{prefix}{name}"), "field required"));
    }
    value
}

fn number(
    obj: &Map<String, Value>,
    prefix: &str,
    name: &str,
    violations: &mut Vec<Violation>,
) -> Option<f64> {
    let value = field(obj, prefix, name, violations)?;
    let n = value.as_f64();
    if n.is_none() {
        violations.push(Violation::new(
            format!("{prefix}{name}"),
            format!("expected a number, got {}", kind(value)),
        ));
    }
    n
}

fn string(
    obj: &Map<String, Value>,
    prefix: &str,
    name: &str,
    violations: &mut Vec<Violation>,
) -> Option<String> {
    let value = field(obj, prefix, name, violations)?;
    let s = value.as_str().map(str::to_owned);
    if s.is_none() {
        violations.push(Violation::new(
            format!("{prefix}{name}"),
            format!("expected a string, got {}", kind(value)),
        ));
    }
    s
}

fn object<'a>(
    obj: &'a Map<String, Value>,
    name: &str,
    violations: &mut Vec<Violation>,
) -> Option<&'a Map<String, Value>> {
    let value = field(obj, "", name, violations)?;
    let map = value.as_object();
    if map.is_none() {
        violations
            .push(Violation::new(name, format!("expected an object, got {}", kind(value))));
    }
    map
}

/// Decodes a homogeneous array. Reports the first element of the wrong type.
fn series<T>(
    hourly: &Map<String, Value>,
    name: &str,
    violations: &mut Vec<Violation>,
    convert: impl Fn(&Value) -> Option<T>,
    expected: &str,
) -> Option<Vec<T>> {
    let path = format!("hourly.{name}");
    let value = field(hourly, "hourly.", name, violations)?;

    let Some(items) = value.as_array() else {
        violations.push(Violation::new(path, format!("expected an array, got {}", kind(value))));
        return None;
    };

    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        match convert(item) {
            Some(v) => out.push(v),
            None => {
                violations.push(Violation::new(
                    path,
                    format!("expected {expected} at index {idx}, got {}", describe(item)),
                ));
                return None;
            }
        }
    }
    Some(out)
}

/// Integers, or floats with no fractional part.
fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        other => kind(other).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_accepts_whole_floats_only() {
        assert_eq!(as_integer(&json!(3)), Some(3));
        assert_eq!(as_integer(&json!(3.0)), Some(3));
        assert_eq!(as_integer(&json!(3.5)), None);
        assert_eq!(as_integer(&json!("3")), None);
    }

    #[test]
    fn non_object_root_is_reported() {
        let mut violations = Vec::new();
        let decoded = decode(&json!([1, 2]), &mut violations);
        assert!(decoded.into_model().is_none());
        assert_eq!(violations, vec![Violation::new("$", "expected an object, got array")]);
    }

    #[test]
    fn null_inside_series_names_index() {
        let hourly = json!({ "temperature_2m": [1.0, null] });
        let mut violations = Vec::new();
        let out = series(
            hourly.as_object().unwrap(),
            TEMPERATURE,
            &mut violations,
            Value::as_f64,
            "a number",
        );
        assert!(out.is_none());
        assert_eq!(violations[0].field, "hourly.temperature_2m");
        assert_eq!(violations[0].reason, "expected a number at index 1, got null");
    }
}
