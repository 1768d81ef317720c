//! Action types, values, and quantization
//!
//! Every vehicle control belongs to one [`ActionType`]. A control carries
//! either a scalar level (temperature, volume, brightness, seat position) or
//! an on/off switch. Levels are bucketed into fixed-width bins before they
//! reach a histogram, so histogram size is bounded by the domain, not by
//! event volume.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Category of vehicle control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Climate,
    Infotainment,
    Lighting,
    Seat,
}

impl ActionType {
    /// All action types, in lexical order of their names
    pub const ALL: [ActionType; 4] = [
        ActionType::Climate,
        ActionType::Infotainment,
        ActionType::Lighting,
        ActionType::Seat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Climate => "climate",
            Self::Infotainment => "infotainment",
            Self::Lighting => "lighting",
            Self::Seat => "seat",
        }
    }

    /// Declared domain for scalar levels of this type
    pub fn domain(&self) -> ValueDomain {
        match self {
            Self::Climate => ValueDomain::new(16.0, 30.0, "°C"),
            Self::Infotainment => ValueDomain::new(0.0, 100.0, "%"),
            Self::Lighting => ValueDomain::new(0.0, 100.0, "%"),
            Self::Seat => ValueDomain::new(0.0, 10.0, ""),
        }
    }

    /// Aliases accepted on the wire as action prefixes
    fn prefixes(&self) -> &'static [&'static str] {
        match self {
            Self::Climate => &["climate"],
            Self::Infotainment => &["infotainment"],
            Self::Lighting => &["lighting", "lights"],
            Self::Seat => &["seats", "seat"],
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        ActionType::ALL
            .into_iter()
            .find(|t| t.prefixes().contains(&lowered.as_str()))
            .ok_or_else(|| ValidationError::UnknownActionType(s.to_string()))
    }
}

/// What an action name asks the vehicle to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionVerb {
    /// Set an absolute level (or an explicit on/off value)
    Set,
    TurnOn,
    TurnOff,
    /// Step up/down from the current state; no absolute value
    Relative,
}

/// Split a wire action name such as `climate_set_temperature` or `lights_turn_off`
/// into its type and verb. A bare type name (`climate`) is a `Set`.
pub fn parse_action(name: &str) -> Result<(ActionType, ActionVerb), ValidationError> {
    let lowered = name.trim().to_ascii_lowercase();
    if lowered.is_empty() {
        return Err(ValidationError::MissingField("action"));
    }

    for action_type in ActionType::ALL {
        for prefix in action_type.prefixes() {
            let rest = if lowered == *prefix {
                Some("")
            } else {
                lowered
                    .strip_prefix(prefix)
                    .and_then(|r| r.strip_prefix('_'))
            };

            if let Some(verb) = rest {
                let verb = match verb {
                    "" | "set" | "set_temperature" | "set_volume" | "set_brightness"
                    | "set_position" | "adjust" => ActionVerb::Set,
                    "turn_on" | "on" | "play" | "heat_on" => ActionVerb::TurnOn,
                    "turn_off" | "off" | "stop" | "heat_off" => ActionVerb::TurnOff,
                    "increase" | "decrease" | "volume_up" | "volume_down" | "dim"
                    | "brighten" => ActionVerb::Relative,
                    _ => return Err(ValidationError::UnknownActionType(name.to_string())),
                };
                return Ok((action_type, verb));
            }
        }
    }

    Err(ValidationError::UnknownActionType(name.to_string()))
}

/// Declared value domain for scalar levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueDomain {
    pub min: f64,
    pub max: f64,
    /// Display unit appended to levels in messages
    pub unit: &'static str,
}

impl ValueDomain {
    pub const fn new(min: f64, max: f64, unit: &'static str) -> Self {
        Self { min, max, unit }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Canonical value of a normalized action
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionValue {
    Level(f64),
    On,
    Off,
}

impl ActionValue {
    /// Map into the histogram key space using a fixed bin width
    pub fn quantize(&self, action_type: ActionType, step: u32) -> QuantizedValue {
        match self {
            Self::Level(level) => QuantizedValue::quantize_level(*level, action_type.domain(), step),
            Self::On => QuantizedValue::On,
            Self::Off => QuantizedValue::Off,
        }
    }
}

/// Histogram key: a level bucket representative or a switch state
///
/// Serialized as its display string so it can be used as a JSON map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QuantizedValue {
    Level(i32),
    On,
    Off,
}

impl QuantizedValue {
    /// Round to the nearest multiple of `step`, clamped into the domain
    pub fn quantize_level(level: f64, domain: ValueDomain, step: u32) -> Self {
        let step = step.max(1) as f64;
        let representative = ((level / step).round() * step).clamp(domain.min, domain.max);
        Self::Level(representative as i32)
    }

    pub fn is_level(&self) -> bool {
        matches!(self, Self::Level(_))
    }
}

impl fmt::Display for QuantizedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Level(v) => write!(f, "{}", v),
            Self::On => f.write_str("on"),
            Self::Off => f.write_str("off"),
        }
    }
}

impl FromStr for QuantizedValue {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            other => other
                .parse::<i32>()
                .map(Self::Level)
                .map_err(|_| ValidationError::InvalidValue {
                    action_type: "unknown".into(),
                    value: s.to_string(),
                }),
        }
    }
}

impl Serialize for QuantizedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QuantizedValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity of one pattern profile
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileKey {
    pub user_id: String,
    pub action_type: ActionType,
}

impl ProfileKey {
    pub fn new(user_id: impl Into<String>, action_type: ActionType) -> Self {
        Self {
            user_id: user_id.into(),
            action_type,
        }
    }
}

impl fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.action_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verb_action_names() {
        assert_eq!(
            parse_action("climate_set_temperature").unwrap(),
            (ActionType::Climate, ActionVerb::Set)
        );
        assert_eq!(
            parse_action("lights_turn_off").unwrap(),
            (ActionType::Lighting, ActionVerb::TurnOff)
        );
        assert_eq!(
            parse_action("infotainment_play").unwrap(),
            (ActionType::Infotainment, ActionVerb::TurnOn)
        );
        assert_eq!(
            parse_action("seats_heat_on").unwrap(),
            (ActionType::Seat, ActionVerb::TurnOn)
        );
        assert_eq!(
            parse_action("seats_adjust").unwrap(),
            (ActionType::Seat, ActionVerb::Set)
        );
        assert_eq!(
            parse_action("climate_increase").unwrap(),
            (ActionType::Climate, ActionVerb::Relative)
        );
    }

    #[test]
    fn test_parse_bare_type() {
        assert_eq!(
            parse_action("Climate").unwrap(),
            (ActionType::Climate, ActionVerb::Set)
        );
        assert!(matches!(
            parse_action("wipers_on"),
            Err(ValidationError::UnknownActionType(_))
        ));
        assert!(matches!(
            parse_action("climatex"),
            Err(ValidationError::UnknownActionType(_))
        ));
        assert_eq!(parse_action("  "), Err(ValidationError::MissingField("action")));
    }

    #[test]
    fn test_quantize_two_degree_bins() {
        let domain = ActionType::Climate.domain();
        assert_eq!(QuantizedValue::quantize_level(22.0, domain, 2), QuantizedValue::Level(22));
        assert_eq!(QuantizedValue::quantize_level(22.9, domain, 2), QuantizedValue::Level(22));
        assert_eq!(QuantizedValue::quantize_level(23.0, domain, 2), QuantizedValue::Level(24));
        assert_eq!(QuantizedValue::quantize_level(18.0, domain, 2), QuantizedValue::Level(18));
    }

    #[test]
    fn test_quantize_clamps_to_domain() {
        let domain = ActionType::Climate.domain();
        assert_eq!(QuantizedValue::quantize_level(30.0, domain, 4), QuantizedValue::Level(30));
        assert_eq!(QuantizedValue::quantize_level(16.0, domain, 5), QuantizedValue::Level(16));
    }

    #[test]
    fn test_quantized_value_as_json_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(QuantizedValue::Level(22), 5u64);
        map.insert(QuantizedValue::On, 1u64);

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"22":5,"on":1}"#);

        let back: std::collections::BTreeMap<QuantizedValue, u64> =
            serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_action_type_order_is_lexical() {
        let mut names: Vec<_> = ActionType::ALL.iter().map(|t| t.as_str()).collect();
        let expected = names.clone();
        names.sort();
        assert_eq!(names, expected);
    }

    proptest::proptest! {
        #[test]
        fn prop_quantized_level_stays_in_domain(level in 0.0f64..=100.0, step in 1u32..=20) {
            for action_type in ActionType::ALL {
                let domain = action_type.domain();
                let level = level.clamp(domain.min, domain.max);
                let QuantizedValue::Level(bucket) = QuantizedValue::quantize_level(level, domain, step) else {
                    panic!("level quantized to a switch state");
                };
                proptest::prop_assert!(domain.contains(bucket as f64));
                proptest::prop_assert!((bucket as f64 - level).abs() <= step as f64);
            }
        }
    }
}
