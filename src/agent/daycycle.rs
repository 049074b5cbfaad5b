//! Weather and time-of-day targets
//!
//! The day cycle is a counter in `0..24000`. Named time targets map to a fixed
//! counter value for `/time set` and to a window used when enforcing them.

use crate::error::AgentError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const DAY_LENGTH: i64 = 24_000;

/// Half-width of the window around a numeric time target
const NUMERIC_TOLERANCE: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeatherType {
    #[default]
    Clear,
    Rain,
    Thunder,
}

impl WeatherType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherType::Clear => "clear",
            WeatherType::Rain => "rain",
            WeatherType::Thunder => "thunder",
        }
    }

    /// Weather as the world currently reports it
    pub fn observed(raining: bool, thundering: bool) -> Self {
        match (raining, thundering) {
            (_, true) => WeatherType::Thunder,
            (true, false) => WeatherType::Rain,
            (false, false) => WeatherType::Clear,
        }
    }

    pub fn command(&self) -> String {
        format!("/weather {}", self.as_str())
    }
}

impl fmt::Display for WeatherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeatherType {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clear" => Ok(WeatherType::Clear),
            "rain" => Ok(WeatherType::Rain),
            "thunder" => Ok(WeatherType::Thunder),
            _ => Err(AgentError::invalid_parameter("Invalid weather type")),
        }
    }
}

/// A named or numeric time-of-day target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeTarget {
    #[default]
    Day,
    Noon,
    Night,
    Midnight,
    Ticks(i64),
}

/// Inclusive counter range; `start > end` means the range wraps past midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn contains(&self, time_of_day: i64) -> bool {
        let t = normalize(time_of_day);
        if self.start <= self.end {
            t >= self.start && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }
}

impl TimeTarget {
    /// Counter value `/time set` moves the world to
    pub fn ticks(&self) -> i64 {
        match self {
            TimeTarget::Day => 1000,
            TimeTarget::Noon => 6000,
            TimeTarget::Night => 13000,
            TimeTarget::Midnight => 18000,
            TimeTarget::Ticks(t) => *t,
        }
    }

    /// Acceptable counter range while enforcing this target
    pub fn window(&self) -> TimeWindow {
        match self {
            TimeTarget::Day => TimeWindow { start: 0, end: 11_999 },
            TimeTarget::Night => TimeWindow {
                start: 12_000,
                end: DAY_LENGTH - 1,
            },
            TimeTarget::Noon => TimeWindow {
                start: 5500,
                end: 6500,
            },
            TimeTarget::Midnight => TimeWindow {
                start: 17_500,
                end: 18_500,
            },
            TimeTarget::Ticks(t) => TimeWindow {
                start: normalize(t - NUMERIC_TOLERANCE),
                end: normalize(t + NUMERIC_TOLERANCE),
            },
        }
    }

    pub fn is_satisfied_by(&self, time_of_day: i64) -> bool {
        self.window().contains(time_of_day)
    }

    pub fn command(&self) -> String {
        format!("/time set {self}")
    }
}

impl fmt::Display for TimeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeTarget::Day => f.write_str("day"),
            TimeTarget::Noon => f.write_str("noon"),
            TimeTarget::Night => f.write_str("night"),
            TimeTarget::Midnight => f.write_str("midnight"),
            TimeTarget::Ticks(t) => write!(f, "{t}"),
        }
    }
}

impl FromStr for TimeTarget {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_lowercase();
        match value.as_str() {
            "day" => Ok(TimeTarget::Day),
            "noon" => Ok(TimeTarget::Noon),
            "night" => Ok(TimeTarget::Night),
            "midnight" => Ok(TimeTarget::Midnight),
            other => match other.parse::<i64>() {
                Ok(t) if (0..DAY_LENGTH).contains(&t) => Ok(TimeTarget::Ticks(t)),
                _ => Err(AgentError::invalid_parameter("Invalid time value")),
            },
        }
    }
}

impl Serialize for TimeTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Accepts `"noon"`, `"6000"` or a bare number
#[derive(Deserialize)]
#[serde(untagged)]
enum TimeValueRepr {
    Text(String),
    Number(i64),
}

impl<'de> Deserialize<'de> for TimeTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = match TimeValueRepr::deserialize(deserializer)? {
            TimeValueRepr::Text(text) => text,
            TimeValueRepr::Number(n) => n.to_string(),
        };
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Coarse label for the current time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DayLabel {
    Day,
    Night,
    Noon,
    Midnight,
}

impl DayLabel {
    pub fn for_time(time_of_day: i64) -> Self {
        let t = normalize(time_of_day);
        if TimeTarget::Noon.window().contains(t) {
            DayLabel::Noon
        } else if TimeTarget::Midnight.window().contains(t) {
            DayLabel::Midnight
        } else if t < 12_000 {
            DayLabel::Day
        } else {
            DayLabel::Night
        }
    }
}

/// Clock string and label derived from the raw counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeDescription {
    pub clock: String,
    pub label: DayLabel,
}

/// Map the counter onto a 24 hour clock, `0 -> 00:00`, `6000 -> 06:00`
pub fn describe_time(time_of_day: i64) -> TimeDescription {
    let t = normalize(time_of_day);
    let total_minutes = t * 24 * 60 / DAY_LENGTH;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    TimeDescription {
        clock: format!("{hours:02}:{minutes:02}"),
        label: DayLabel::for_time(t),
    }
}

fn normalize(time_of_day: i64) -> i64 {
    time_of_day.rem_euclid(DAY_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_day_labels() {
        assert_eq!(DayLabel::for_time(6000), DayLabel::Noon);
        assert_eq!(DayLabel::for_time(18000), DayLabel::Midnight);
        assert_eq!(DayLabel::for_time(3000), DayLabel::Day);
        assert_eq!(DayLabel::for_time(15000), DayLabel::Night);
    }

    #[test]
    fn test_label_window_edges() {
        assert_eq!(DayLabel::for_time(5499), DayLabel::Day);
        assert_eq!(DayLabel::for_time(5500), DayLabel::Noon);
        assert_eq!(DayLabel::for_time(6500), DayLabel::Noon);
        assert_eq!(DayLabel::for_time(11_999), DayLabel::Day);
        assert_eq!(DayLabel::for_time(12_000), DayLabel::Night);
        assert_eq!(DayLabel::for_time(17_500), DayLabel::Midnight);
        assert_eq!(DayLabel::for_time(18_501), DayLabel::Night);
    }

    #[test]
    fn test_describe_time() {
        assert_eq!(describe_time(0).clock, "00:00");
        assert_eq!(describe_time(6000).clock, "06:00");
        assert_eq!(describe_time(13_000).clock, "13:00");
        assert_eq!(describe_time(1500).clock, "01:30");
        assert_eq!(describe_time(23_999).clock, "23:59");
        assert_eq!(describe_time(24_000 + 6000).label, DayLabel::Noon);
    }

    #[test]
    fn test_weather_parse() {
        assert_eq!("clear".parse::<WeatherType>().unwrap(), WeatherType::Clear);
        assert_eq!("RAIN".parse::<WeatherType>().unwrap(), WeatherType::Rain);
        assert_eq!("thunder".parse::<WeatherType>().unwrap(), WeatherType::Thunder);

        let err = "snow".parse::<WeatherType>().unwrap_err();
        assert_eq!(err, AgentError::invalid_parameter("Invalid weather type"));
    }

    #[test]
    fn test_observed_weather() {
        assert_eq!(WeatherType::observed(false, false), WeatherType::Clear);
        assert_eq!(WeatherType::observed(true, false), WeatherType::Rain);
        assert_eq!(WeatherType::observed(true, true), WeatherType::Thunder);
        assert_eq!(WeatherType::Rain.command(), "/weather rain");
    }

    #[test]
    fn test_time_target_parse() {
        assert_eq!("day".parse::<TimeTarget>().unwrap(), TimeTarget::Day);
        assert_eq!("Midnight".parse::<TimeTarget>().unwrap(), TimeTarget::Midnight);
        assert_eq!("4000".parse::<TimeTarget>().unwrap(), TimeTarget::Ticks(4000));
        assert!("24000".parse::<TimeTarget>().is_err());
        assert!("-1".parse::<TimeTarget>().is_err());
        assert!("dusk".parse::<TimeTarget>().is_err());
    }

    #[test]
    fn test_time_commands() {
        assert_eq!(TimeTarget::Noon.command(), "/time set noon");
        assert_eq!(TimeTarget::Ticks(4000).command(), "/time set 4000");
    }

    #[test]
    fn test_named_windows() {
        assert!(TimeTarget::Day.is_satisfied_by(1000));
        assert!(!TimeTarget::Day.is_satisfied_by(13_000));
        assert!(TimeTarget::Night.is_satisfied_by(13_000));
        assert!(!TimeTarget::Noon.is_satisfied_by(7000));
        assert!(TimeTarget::Midnight.is_satisfied_by(18_400));
    }

    #[test]
    fn test_numeric_window_wraps() {
        let target = TimeTarget::Ticks(200);
        assert!(target.is_satisfied_by(23_800));
        assert!(target.is_satisfied_by(700));
        assert!(!target.is_satisfied_by(701));
        assert!(!target.is_satisfied_by(23_699));
    }

    #[test]
    fn test_time_target_serde() {
        let json = serde_json::to_string(&TimeTarget::Noon).unwrap();
        assert_eq!(json, "\"noon\"");
        let json = serde_json::to_string(&TimeTarget::Ticks(4000)).unwrap();
        assert_eq!(json, "\"4000\"");

        let parsed: TimeTarget = serde_json::from_str("\"night\"").unwrap();
        assert_eq!(parsed, TimeTarget::Night);
        let parsed: TimeTarget = serde_json::from_str("4000").unwrap();
        assert_eq!(parsed, TimeTarget::Ticks(4000));
        assert!(serde_json::from_str::<TimeTarget>("\"teatime\"").is_err());
    }

    proptest! {
        #[test]
        fn target_is_satisfied_by_its_own_ticks(t in 0i64..24_000) {
            prop_assert!(TimeTarget::Ticks(t).is_satisfied_by(t));
        }

        #[test]
        fn named_targets_land_inside_their_windows(
            target in prop_oneof![
                Just(TimeTarget::Day),
                Just(TimeTarget::Noon),
                Just(TimeTarget::Night),
                Just(TimeTarget::Midnight),
            ]
        ) {
            prop_assert!(target.is_satisfied_by(target.ticks()));
        }

        #[test]
        fn clock_string_is_well_formed(t in any::<i64>()) {
            let description = describe_time(t);
            prop_assert_eq!(description.clock.len(), 5);
            prop_assert_eq!(&description.clock[2..3], ":");
        }
    }
}
