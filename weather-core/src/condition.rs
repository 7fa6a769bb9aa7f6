use std::fmt;

/// Provider-agnostic weather condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeatherCondition {
    Clear,
    PartiallyCloudy,
    Cloudy,
    Overcast,
    Mist,
    Fog,
    Drizzle,
    LightRain,
    ModerateRain,
    HeavyRain,
    LightSnow,
    ModerateSnow,
    HeavySnow,
    Thunderstorm,
    Unrecognized,
}

impl WeatherCondition {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartiallyCloudy => "Partially Cloudy",
            Self::Cloudy => "Cloudy",
            Self::Overcast => "Overcast",
            Self::Mist => "Mist",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::LightRain => "Light Rain",
            Self::ModerateRain => "Moderate Rain",
            Self::HeavyRain => "Heavy Rain",
            Self::LightSnow => "Light Snow",
            Self::ModerateSnow => "Moderate Snow",
            Self::HeavySnow => "Heavy Snow",
            Self::Thunderstorm => "Thunderstorm",
            Self::Unrecognized => "Unrecognized",
        }
    }

    /// Map a free-text description (e.g. WeatherAPI's `condition.text`).
    ///
    /// Qualifiers that carry no category ("at times", "shower") are dropped and
    /// synonyms are folded ("slight"/"patchy" -> "light", "violent" -> "heavy")
    /// before keyword matching.
    pub fn from_description(text: &str) -> Self {
        let text = text
            .to_lowercase()
            .replace("shower", "")
            .replace("at times", "")
            .replace("slight", "light")
            .replace("fall", "")
            .replace("partly", "partially")
            .replace("patchy", "light")
            .replace("violent", "heavy");
        let text = text.trim();

        if text.contains("thunder") {
            Self::Thunderstorm
        } else if text.contains("clear") || text.contains("sunny") {
            Self::Clear
        } else if text.contains("cloudy") {
            if text.contains("partially") { Self::PartiallyCloudy } else { Self::Cloudy }
        } else if text.contains("drizzle") {
            Self::Drizzle
        } else if text.contains("rain") {
            Self::by_intensity(text, Self::LightRain, Self::ModerateRain, Self::HeavyRain)
        } else if text.contains("snow") {
            Self::by_intensity(text, Self::LightSnow, Self::ModerateSnow, Self::HeavySnow)
        } else if text.contains("mist") {
            Self::Mist
        } else if text.contains("fog") {
            Self::Fog
        } else if text.contains("overcast") {
            Self::Overcast
        } else {
            Self::Unrecognized
        }
    }

    /// Map a WMO weather interpretation code (Open-Meteo `weather_code`).
    /// See: https://open-meteo.com/en/docs#weathervariables
    pub fn from_wmo_code(code: i64) -> Self {
        match code {
            0 | 1 => Self::Clear,
            2 => Self::PartiallyCloudy,
            3 => Self::Overcast,
            45 | 48 => Self::Fog,
            51 | 53 | 55 | 56 | 57 => Self::Drizzle,
            61 | 66 | 80 => Self::LightRain,
            63 | 81 => Self::ModerateRain,
            65 | 67 | 82 => Self::HeavyRain,
            71 | 85 => Self::LightSnow,
            73 | 77 => Self::ModerateSnow,
            75 | 86 => Self::HeavySnow,
            95 | 96 | 99 => Self::Thunderstorm,
            _ => Self::Unrecognized,
        }
    }

    fn by_intensity(text: &str, light: Self, moderate: Self, heavy: Self) -> Self {
        if text.contains("light") {
            light
        } else if text.contains("moderate") {
            moderate
        } else if text.contains("heavy") {
            heavy
        } else {
            moderate
        }
    }
}

impl fmt::Display for WeatherCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
