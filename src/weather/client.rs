use std::thread;
use std::time::Duration;

use serde::Deserialize;

use crate::config::WeatherSettings;

#[derive(Debug, Clone, PartialEq)]
pub struct Weather {
    pub temperature_c: f64,
    pub code: i32,
    /// Observation time as reported, in the location's local time.
    pub time: String,
    pub timezone: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Request(String),

    #[error("weather service answered HTTP {0}")]
    Status(u16),

    #[error("unexpected weather response")]
    Parse(#[from] serde_json::Error),
}

impl WeatherError {
    fn is_retryable(&self) -> bool {
        match self {
            WeatherError::Request(_) => true,
            WeatherError::Status(code) => *code >= 500 || *code == 429,
            WeatherError::Parse(_) => false,
        }
    }
}

/// Something that can look up the current weather at a coordinate.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, lat: f64, lng: f64) -> Result<Weather, WeatherError>;
}

#[derive(Deserialize)]
struct ForecastResponse {
    current_weather: CurrentWeather,
    #[serde(default)]
    timezone: Option<String>,
}

#[derive(Deserialize)]
struct CurrentWeather {
    temperature: f64,
    #[serde(alias = "weather_code")]
    weathercode: i32,
    #[serde(default)]
    time: String,
}

/// Open-Meteo forecast API.
pub struct OpenMeteo {
    client: reqwest::blocking::Client,
    endpoint: String,
    retries: u32,
}

impl OpenMeteo {
    pub fn new(settings: &WeatherSettings) -> Result<Self, WeatherError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| WeatherError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            retries: settings.retries,
        })
    }

    fn fetch_once(&self, lat: f64, lng: f64) -> Result<Weather, WeatherError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lng.to_string()),
                ("current_weather", "true".to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .map_err(|e| WeatherError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(WeatherError::Status(status.as_u16()));
        }
        let body = resp
            .text()
            .map_err(|e| WeatherError::Request(e.to_string()))?;
        parse_forecast(&body)
    }
}

impl Fetcher for OpenMeteo {
    fn fetch(&self, lat: f64, lng: f64) -> Result<Weather, WeatherError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(lat, lng) {
                Ok(w) => return Ok(w),
                Err(e) if attempt < self.retries && e.is_retryable() => {
                    attempt += 1;
                    tracing::debug!(attempt, error = %e, "retrying weather request");
                    thread::sleep(Duration::from_millis(250 * u64::from(attempt)));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

pub(crate) fn parse_forecast(body: &str) -> Result<Weather, WeatherError> {
    let parsed: ForecastResponse = serde_json::from_str(body)?;
    Ok(Weather {
        temperature_c: parsed.current_weather.temperature,
        code: parsed.current_weather.weathercode,
        time: parsed.current_weather.time,
        timezone: parsed.timezone.filter(|t| !t.is_empty()),
    })
}
