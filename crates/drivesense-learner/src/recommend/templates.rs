//! Natural-language suggestion templates

use drivesense_common::{ActionType, QuantizedValue};

/// Default message prefix
pub const DEFAULT_GREETING: &str = "Based on your preferences,";

/// Action phrase for a predicted value, e.g. "set climate to 22°C"
pub fn phrase(action_type: ActionType, value: QuantizedValue) -> String {
    use ActionType::*;
    use QuantizedValue::*;

    match (action_type, value) {
        (Climate, Level(v)) => format!("set climate to {}°C", v),
        (Climate, On) => "turn on the climate control".to_string(),
        (Climate, Off) => "turn off the climate control".to_string(),
        (Infotainment, Level(v)) => format!("set the volume to {}%", v),
        (Infotainment, On) => "start playing your music".to_string(),
        (Infotainment, Off) => "stop the music".to_string(),
        (Lighting, Level(v)) => format!("set the ambient lights to {}% brightness", v),
        (Lighting, On) => "turn on the ambient lights".to_string(),
        (Lighting, Off) => "turn off the ambient lights".to_string(),
        (Seat, Level(v)) => format!("move your seat to position {}", v),
        (Seat, On) => "warm up your seat".to_string(),
        (Seat, Off) => "turn off the seat heating".to_string(),
    }
}

/// Full prompt: "{greeting} would you like me to {phrase}?"
pub fn render(greeting: &str, action_type: ActionType, value: QuantizedValue) -> String {
    let greeting = greeting.trim();
    let greeting = if greeting.is_empty() { DEFAULT_GREETING } else { greeting };
    format!("{} would you like me to {}?", greeting, phrase(action_type, value))
}

/// Break reminder text
pub fn break_reminder(minutes: i64) -> String {
    format!(
        "You've been driving for {} minutes. Would you like me to find a place to take a break?",
        minutes.max(1)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_climate() {
        assert_eq!(
            render(DEFAULT_GREETING, ActionType::Climate, QuantizedValue::Level(22)),
            "Based on your preferences, would you like me to set climate to 22°C?"
        );
        assert_eq!(
            render("", ActionType::Climate, QuantizedValue::On),
            "Based on your preferences, would you like me to turn on the climate control?"
        );
    }

    #[test]
    fn test_every_combination_has_a_phrase() {
        for t in ActionType::ALL {
            for v in [QuantizedValue::Level(5), QuantizedValue::On, QuantizedValue::Off] {
                assert!(!phrase(t, v).is_empty());
            }
        }
        assert_eq!(
            phrase(ActionType::Lighting, QuantizedValue::Level(60)),
            "set the ambient lights to 60% brightness"
        );
        assert_eq!(phrase(ActionType::Seat, QuantizedValue::On), "warm up your seat");
    }

    #[test]
    fn test_custom_greeting() {
        assert_eq!(
            render("Good morning!", ActionType::Infotainment, QuantizedValue::Off),
            "Good morning! would you like me to stop the music?"
        );
    }
}
