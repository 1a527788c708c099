use serde::{Deserialize, Serialize};

/// Untyped upstream response, kept verbatim so it can be stored unchanged.
pub type RawObservationPayload = serde_json::Value;

/// Timezone label requested from (and required of) the upstream API.
pub const GMT: &str = "GMT";

/// A named geographic point for which history is requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub country: String,
}

impl Location {
    pub fn new(
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        country: impl Into<String>,
    ) -> Self {
        Self { name: name.into(), latitude, longitude, country: country.into() }
    }

    /// Lowercased name with whitespace removed, used in storage keys.
    pub fn normalized_name(&self) -> String {
        self.name.chars().filter(|c| !c.is_whitespace()).flat_map(char::to_lowercase).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub start_date: String,
    pub end_date: String,
    pub hourly: Vec<String>,
    pub timezone: String,
}

impl FetchRequest {
    pub fn for_location(
        location: &Location,
        range: &crate::DateRange,
        metrics: &[String],
    ) -> Self {
        Self {
            latitude: location.latitude,
            longitude: location.longitude,
            start_date: range.start_str(),
            end_date: range.end_str(),
            hourly: metrics.to_vec(),
            timezone: GMT.to_string(),
        }
    }

    /// Query pairs in the order the archive API documents them.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            ("start_date", self.start_date.clone()),
            ("end_date", self.end_date.clone()),
            ("hourly", self.hourly.join(",")),
            ("timezone", self.timezone.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyUnits {
    pub time: String,
    pub temperature_2m: String,
    pub relative_humidity_2m: String,
    pub weather_code: String,
    pub wind_speed_10m: String,
    pub precipitation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlySeries {
    pub time: Vec<String>,
    pub temperature_2m: Vec<f64>,
    pub relative_humidity_2m: Vec<f64>,
    pub weather_code: Vec<i64>,
    pub wind_speed_10m: Vec<f64>,
    pub precipitation: Vec<f64>,
}

impl HourlySeries {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// Typed form of an upstream response that passed every validation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedObservationSet {
    pub latitude: f64,
    pub longitude: f64,
    pub generationtime_ms: f64,
    pub utc_offset_seconds: f64,
    pub timezone: String,
    pub timezone_abbreviation: String,
    pub elevation: f64,
    pub hourly_units: HourlyUnits,
    pub hourly: HourlySeries,
}

/// Pipeline step at which a location gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fetch,
    Validation,
    Storage,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FailureStage::Fetch => "fetch",
            FailureStage::Validation => "validation",
            FailureStage::Storage => "storage",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationFailure {
    pub location: String,
    pub stage: FailureStage,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub total_records: usize,
    pub expected_records: usize,
    pub locations_processed: Vec<String>,
    pub failures: Vec<LocationFailure>,
}
