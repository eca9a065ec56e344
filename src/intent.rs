//! Free-text intent recognition for the interactive agent

/// What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Irrigation,
    Fertilizer,
    Weather,
    PlantingsCount,
    SoilStatus,
    Unknown,
}

/// Crop and location picked out of the sentence, lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntentParams {
    pub crop: Option<String>,
    pub location: Option<String>,
}

impl IntentParams {
    pub fn is_empty(&self) -> bool {
        self.crop.is_none() && self.location.is_none()
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(crop) = &self.crop {
            parts.push(format!("crop:{}", crop));
        }
        if let Some(location) = &self.location {
            parts.push(format!("location:{}", location));
        }
        parts.join(", ")
    }
}

const IRRIGATION_WORDS: &[&str] = &["irrigation", "water", "irrigate"];
const FERTILIZER_WORDS: &[&str] = &["fertilizer", "nutrient", "nitrogen", "npk"];
const WEATHER_WORDS: &[&str] = &["weather", "temperature", "forecast"];
const PLANTINGS_WORDS: &[&str] = &["planting"];
const SOIL_WORDS: &[&str] = &["soil", "moisture", "dirt"];

/// Classify `input` and extract any known crop/location names from it.
pub fn recognize(input: &str, crops: &[String], locations: &[String]) -> (Intent, IntentParams) {
    let lowered = input.to_lowercase();
    let words = tokens(&lowered);

    let params = IntentParams {
        crop: find_name(&words, crops),
        location: find_name(&words, locations),
    };

    let has_any = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));
    let intent = if has_any(IRRIGATION_WORDS) {
        Intent::Irrigation
    } else if has_any(FERTILIZER_WORDS) {
        Intent::Fertilizer
    } else if has_any(WEATHER_WORDS) {
        Intent::Weather
    } else if has_any(PLANTINGS_WORDS) {
        Intent::PlantingsCount
    } else if has_any(SOIL_WORDS) {
        Intent::SoilStatus
    } else {
        Intent::Unknown
    };

    (intent, params)
}

fn tokens(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// "strawberries" → "strawberry", "plantings" → "planting"
fn singular(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        format!("{}y", stem)
    } else if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

/// Longest known name whose words appear consecutively in `words`.
fn find_name(words: &[String], names: &[String]) -> Option<String> {
    let mut candidates: Vec<(&String, Vec<String>)> = names
        .iter()
        .map(|name| (name, tokens(name)))
        .filter(|(_, t)| !t.is_empty())
        .collect();
    candidates.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(b.0.len().cmp(&a.0.len())));

    candidates.into_iter().find_map(|(name, name_words)| {
        words
            .windows(name_words.len())
            .any(|window| {
                window
                    .iter()
                    .zip(&name_words)
                    .all(|(w, n)| w == n || singular(w) == *n)
            })
            .then(|| name.to_lowercase())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_irrigation_with_crop_and_location() {
        let (intent, params) = recognize(
            "How much water for strawberries in Salinas?",
            &names(&["lettuce", "strawberry"]),
            &names(&["salinas", "pryor ranch"]),
        );
        assert_eq!(intent, Intent::Irrigation);
        assert_eq!(params.crop.as_deref(), Some("strawberry"));
        assert_eq!(params.location.as_deref(), Some("salinas"));
    }

    #[test]
    fn test_multi_word_location_prefers_longest() {
        let (intent, params) = recognize(
            "How many plantings in Pryor Ranch?",
            &[],
            &names(&["pryor", "pryor ranch"]),
        );
        assert_eq!(intent, Intent::PlantingsCount);
        assert_eq!(params.location.as_deref(), Some("pryor ranch"));
    }

    #[test]
    fn test_keyword_priority() {
        assert_eq!(recognize("nitrogen for lettuce", &[], &[]).0, Intent::Fertilizer);
        assert_eq!(recognize("What's the weather in Watsonville?", &[], &[]).0, Intent::Weather);
        assert_eq!(recognize("soil moisture please", &[], &[]).0, Intent::SoilStatus);
        assert_eq!(recognize("hello there", &[], &[]).0, Intent::Unknown);
        assert_eq!(recognize("irrigation plantings", &[], &[]).0, Intent::Irrigation);
    }

    #[test]
    fn test_partial_word_is_not_a_name() {
        let (_, params) = recognize("peach weather", &names(&["pea"]), &[]);
        assert_eq!(params.crop, None);
    }

    #[test]
    fn test_describe_params() {
        let params = IntentParams {
            crop: Some("lettuce".into()),
            location: Some("salinas".into()),
        };
        assert_eq!(params.describe(), "crop:lettuce, location:salinas");
        assert!(IntentParams::default().is_empty());
    }
}
