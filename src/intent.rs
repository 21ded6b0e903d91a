use serde::{Deserialize, Serialize};

/// A service category inferred from a user message, together with the
/// original query text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIntent {
    pub category: String,
    #[serde(default)]
    pub query: String,
}

/// key: intent-extractor -> keyword dictionary
///
/// Ordered category -> keyword table. Matching is first-match-wins in table
/// order, not smartest-match; the dictionary is a replaceable lookup table.
static CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("electrician", &["electrician", "electric", "wiring", "power", "light", "fan", "switch"]),
    ("plumber", &["plumber", "plumbing", "pipe", "water", "tap", "leak", "drain", "toilet"]),
    ("carpenter", &["carpenter", "carpentry", "furniture", "wood", "cabinet", "door"]),
    ("painter", &["painter", "painting", "paint", "wall", "color"]),
    ("ac-repair", &["ac", "air conditioner", "cooling", "hvac"]),
    ("cleaning", &["cleaning", "cleaner", "housekeeping", "maid", "deep clean"]),
    ("tutoring", &["tutor", "teacher", "teaching", "coaching", "tuition"]),
    ("beauty", &["beauty", "salon", "parlour", "haircut", "makeup", "facial"]),
    ("mechanic", &["mechanic", "car", "bike", "vehicle", "garage"]),
    ("legal", &["lawyer", "legal", "advocate", "law", "court"]),
    ("medical", &["doctor", "medical", "clinic", "health"]),
    ("it-tech", &["computer", "laptop", "it", "tech", "software"]),
    ("photography", &["photographer", "photography", "photo", "video"]),
    ("catering", &["catering", "caterer", "food", "cook", "chef"]),
    ("event-planning", &["event", "wedding", "party", "decoration"]),
    ("pest-control", &["pest", "cockroach", "termite", "insect", "rat"]),
];

/// Case-insensitive substring match of the message against the keyword
/// table. Returns `None` when no keyword matches.
pub fn extract_search_intent(message: &str) -> Option<SearchIntent> {
    let lowered = message.to_lowercase();
    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|keyword| lowered.contains(keyword)) {
            return Some(SearchIntent {
                category: (*category).to_string(),
                query: message.to_string(),
            });
        }
    }
    None
}

/// Prettify a category slug for display: `"ac-repair"` -> `"Ac Repair"`.
pub fn format_category(slug: &str) -> String {
    slug.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaking_tap_maps_to_plumber() {
        let intent = extract_search_intent("my tap is leaking").unwrap();
        assert_eq!(intent.category, "plumber");
        assert_eq!(intent.query, "my tap is leaking");
    }

    #[test]
    fn unknown_message_yields_none() {
        assert!(extract_search_intent("hello there, how are you?").is_none());
    }

    #[test]
    fn match_is_case_insensitive() {
        let intent = extract_search_intent("Need an ELECTRICIAN urgently").unwrap();
        assert_eq!(intent.category, "electrician");
    }

    #[test]
    fn first_table_entry_wins_on_ambiguity() {
        // "light" (electrician) appears before "water" (plumber) in table order.
        let intent = extract_search_intent("the light over my water heater died").unwrap();
        assert_eq!(intent.category, "electrician");
    }

    #[test]
    fn category_slug_formatting() {
        assert_eq!(format_category("ac-repair"), "Ac Repair");
        assert_eq!(format_category("plumber"), "Plumber");
        assert_eq!(format_category("event-planning"), "Event Planning");
    }
}
