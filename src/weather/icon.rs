#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WeatherIcon {
    Clear,
    PartlyCloudy,
    Fog,
    Rain,
    Snow,
    Storm,
    Unknown,
}

impl WeatherIcon {
    pub fn glyph(self) -> &'static str {
        match self {
            WeatherIcon::Clear => "☀️",
            WeatherIcon::PartlyCloudy => "⛅",
            WeatherIcon::Fog => "🌫️",
            WeatherIcon::Rain => "🌧️",
            WeatherIcon::Snow => "❄️",
            WeatherIcon::Storm => "⛈️",
            WeatherIcon::Unknown => "🌡️",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WeatherIcon::Clear => "clear",
            WeatherIcon::PartlyCloudy => "partly cloudy",
            WeatherIcon::Fog => "fog",
            WeatherIcon::Rain => "rain",
            WeatherIcon::Snow => "snow",
            WeatherIcon::Storm => "storm",
            WeatherIcon::Unknown => "weather",
        }
    }
}

/// Map a WMO weather code to its icon.
pub fn weather_icon(code: i32) -> WeatherIcon {
    match code {
        0 => WeatherIcon::Clear,
        1..=3 => WeatherIcon::PartlyCloudy,
        45..=48 => WeatherIcon::Fog,
        51..=67 => WeatherIcon::Rain,
        71..=86 => WeatherIcon::Snow,
        95.. => WeatherIcon::Storm,
        _ => WeatherIcon::Unknown,
    }
}
