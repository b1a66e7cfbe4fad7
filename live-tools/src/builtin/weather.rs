//! Deterministic forecast plugin.
//!
//! Forecasts are derived from a hash of the location and date rather than a
//! live service, so identical inputs always produce identical forecasts.

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use live_primitives::{Declarations, FunctionDeclaration, ParameterSchema};
use serde::Serialize;
use serde_json::{Value, json};

use crate::plugin::{Arguments, PluginError, PluginResult, ToolPlugin};

/// Operation name advertised to the model.
pub const OPERATION: &str = "get_weather_on_date";

const DATE_FORMAT: &str = "%Y-%m-%d";
const CONDITION_COUNT: u32 = 5;
const CONDITIONS: [&str; CONDITION_COUNT as usize] = [
    "Sunny",
    "Cloudy",
    "Rainy",
    "Partly Cloudy",
    "Thunderstorms",
];
const BASE_TEMPERATURE_C: u32 = 20;
const TEMPERATURE_SPREAD: u32 = 15;

/// Forecast returned for a location and date.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Forecast {
    /// Location as supplied by the caller.
    pub location: String,
    /// Calendar date in `YYYY-MM-DD` form.
    pub date: String,
    /// Weather condition label.
    pub condition: &'static str,
    /// Temperature in degrees Celsius.
    pub temperature: u32,
    /// Unit of `temperature`.
    pub unit: &'static str,
}

impl Forecast {
    /// Computes the forecast for `location` on `date`.
    #[must_use]
    pub fn compute(location: &str, date: &str) -> Self {
        let hash = stable_hash(&format!("{location}{date}"));
        let condition = CONDITIONS[(hash % CONDITION_COUNT) as usize];
        let temperature = BASE_TEMPERATURE_C + (hash / CONDITION_COUNT) % TEMPERATURE_SPREAD;

        Self {
            location: location.to_owned(),
            date: date.to_owned(),
            condition,
            temperature,
            unit: "celsius",
        }
    }
}

/// Order-dependent running hash over UTF-16 code units, folded into `i32`.
fn stable_hash(input: &str) -> u32 {
    let mut hash: i32 = 0;
    for unit in input.encode_utf16() {
        hash = (hash << 5).wrapping_sub(hash).wrapping_add(i32::from(unit));
    }
    hash.unsigned_abs()
}

fn today() -> String {
    Local::now().format(DATE_FORMAT).to_string()
}

/// Plugin answering `get_weather_on_date` calls.
#[derive(Clone, Copy, Debug, Default)]
pub struct WeatherPlugin;

impl WeatherPlugin {
    /// Creates the plugin.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolPlugin for WeatherPlugin {
    fn describe(&self) -> PluginResult<Declarations> {
        let declaration = FunctionDeclaration::builder(OPERATION)
            .description(
                "Get the weather forecast for a location on a specific date. \
                 Defaults to today when no date is given.",
            )
            .parameters(
                ParameterSchema::object()
                    .required_property(
                        "location",
                        json!({
                            "type": "string",
                            "description": "City or place name, e.g. \"Manila\""
                        }),
                    )
                    .property(
                        "date",
                        json!({
                            "type": "string",
                            "description": "Date in YYYY-MM-DD format"
                        }),
                    ),
            )
            .build()
            .map_err(|err| PluginError::describe(err.to_string()))?;
        Ok(declaration.into())
    }

    async fn execute(&self, args: Arguments) -> PluginResult<Value> {
        let location = args.require_str("location")?;
        let date = match args.optional_str("date")? {
            Some(date) => {
                NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|err| {
                    PluginError::invalid_argument("date", format!("expected YYYY-MM-DD: {err}"))
                })?;
                date.to_owned()
            }
            None => today(),
        };

        let forecast = Forecast::compute(location, &date);
        serde_json::to_value(forecast)
            .map_err(|err| PluginError::execution(format!("failed to encode forecast: {err}")))
    }
}
