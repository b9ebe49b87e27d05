//! Weather service payloads
//!
//! A forecast is written as three characteristics: condition codes, minimum
//! temperatures and maximum temperatures. Each holds one big-endian 16-bit
//! value per day, in day order.

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::MAX_FORECAST_ENTRIES;
use crate::core::codec::CodecError;

/// Offset between the watch's temperature unit and Celsius
pub const KELVIN_OFFSET: i16 = 273;

macro_rules! weather_conditions {
    ($($name:ident = $code:literal,)*) => {
        /// OpenWeatherMap condition codes, as the watch's icon set understands them.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum WeatherCondition {
            $($name,)*
            /// A code this crate has no name for, passed through unchanged
            Unknown(u16),
        }

        impl WeatherCondition {
            pub fn from_code(code: u16) -> Self {
                match code {
                    $($code => Self::$name,)*
                    other => Self::Unknown(other),
                }
            }

            pub fn code(&self) -> u16 {
                match self {
                    $(Self::$name => $code,)*
                    Self::Unknown(code) => *code,
                }
            }
        }
    };
}

weather_conditions! {
    ThunderstormLightRain = 200,
    ThunderstormRain = 201,
    ThunderstormHeavyRain = 202,
    ThunderstormLight = 210,
    Thunderstorm = 211,
    ThunderstormHeavy = 212,
    ThunderstormRagged = 221,
    ThunderstormLightDrizzle = 230,
    ThunderstormDrizzle = 231,
    ThunderstormHeavyDrizzle = 232,
    DrizzleLight = 300,
    Drizzle = 301,
    DrizzleHeavy = 302,
    DrizzleLightRain = 310,
    DrizzleRain = 311,
    DrizzleHeavyRain = 312,
    DrizzleShowerRain = 313,
    DrizzleHeavyShowerRain = 314,
    DrizzleShower = 321,
    RainLight = 500,
    RainModerate = 501,
    RainHeavy = 502,
    RainVeryHeavy = 503,
    RainExtreme = 504,
    RainFreezing = 511,
    RainShowerLight = 520,
    RainShower = 521,
    RainShowerHeavy = 522,
    RainShowerRagged = 531,
    SnowLight = 600,
    Snow = 601,
    SnowHeavy = 602,
    Sleet = 611,
    SleetShowerLight = 612,
    SleetShower = 613,
    RainSnowLight = 615,
    RainSnow = 616,
    SnowShowerLight = 620,
    SnowShower = 621,
    SnowShowerHeavy = 622,
    Mist = 701,
    Smoke = 711,
    Haze = 721,
    DustWhirls = 731,
    Fog = 741,
    Sand = 751,
    Dust = 761,
    Ash = 762,
    Squalls = 771,
    Tornado = 781,
    Clear = 800,
    CloudsFew = 801,
    CloudsScattered = 802,
    CloudsBroken = 803,
    CloudsOvercast = 804,
}

impl From<u16> for WeatherCondition {
    fn from(code: u16) -> Self {
        WeatherCondition::from_code(code)
    }
}

/// One forecast day. Temperatures are Celsius + 273.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub condition: WeatherCondition,
    pub min_temp: i16,
    pub max_temp: i16,
}

impl ForecastEntry {
    pub fn from_celsius(condition: impl Into<WeatherCondition>, min: i16, max: i16) -> Self {
        Self {
            condition: condition.into(),
            min_temp: min.saturating_add(KELVIN_OFFSET),
            max_temp: max.saturating_add(KELVIN_OFFSET),
        }
    }

    pub fn from_fahrenheit(condition: impl Into<WeatherCondition>, min: f64, max: f64) -> Self {
        Self::from_celsius(
            condition,
            fahrenheit_to_celsius(min),
            fahrenheit_to_celsius(max),
        )
    }
}

/// Converts to whole degrees Celsius, rounding half away from zero.
pub fn fahrenheit_to_celsius(fahrenheit: f64) -> i16 {
    ((fahrenheit - 32.0) / 1.8).round() as i16
}

/// The three characteristic values making up a forecast.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForecastPayload {
    pub ids: Vec<u8>,
    pub min_temps: Vec<u8>,
    pub max_temps: Vec<u8>,
}

pub fn encode_city(city: &str) -> Vec<u8> {
    city.as_bytes().to_vec()
}

/// Fails if there are more entries than the watch has forecast slots.
pub fn encode_forecast(entries: &[ForecastEntry]) -> Result<ForecastPayload, CodecError> {
    if entries.len() > MAX_FORECAST_ENTRIES {
        return Err(CodecError::TooManyForecastEntries {
            len: entries.len(),
            max: MAX_FORECAST_ENTRIES,
        });
    }

    let mut payload = ForecastPayload::default();
    for entry in entries {
        payload.ids.extend_from_slice(&entry.condition.code().to_be_bytes());
        payload.min_temps.extend_from_slice(&entry.min_temp.to_be_bytes());
        payload.max_temps.extend_from_slice(&entry.max_temp.to_be_bytes());
    }
    Ok(payload)
}
