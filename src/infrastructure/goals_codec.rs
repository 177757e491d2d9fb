use crate::domain::models::GoalsDocument;
use crate::infrastructure::error::InfraError;

pub const GOALS_MARKER: &str = "deloist:goals:v1";
const FENCE: &str = "```";
const BYTE_ORDER_MARK: char = '\u{feff}';

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedGoals {
    Decoded {
        document: GoalsDocument,
        needs_repair: bool,
    },
    NoFence,
    Malformed(String),
}

pub fn encode_goals_comment(document: &GoalsDocument) -> Result<String, InfraError> {
    let body = serde_json::to_string_pretty(document)?;
    Ok(format!("{GOALS_MARKER}\n{FENCE}json\n{body}\n{FENCE}"))
}

pub fn has_goals_marker(content: &str) -> bool {
    content.trim_start_matches(BYTE_ORDER_MARK).contains(GOALS_MARKER)
}

/// Decodes the first fenced block after the marker. `None` when the comment
/// does not carry the marker at all.
pub fn decode_goals_comment(content: &str) -> Option<DecodedGoals> {
    let content = content.trim_start_matches(BYTE_ORDER_MARK);
    let marker_at = content.find(GOALS_MARKER)?;
    let after_marker = &content[marker_at + GOALS_MARKER.len()..];

    let Some(body) = fenced_body(after_marker) else {
        return Some(DecodedGoals::NoFence);
    };

    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(error) => return Some(DecodedGoals::Malformed(error.to_string())),
    };
    let document: GoalsDocument = match serde_json::from_value(value.clone()) {
        Ok(document) => document,
        Err(error) => return Some(DecodedGoals::Malformed(error.to_string())),
    };

    // Any field filled by a default shows up as a difference after re-encoding.
    let needs_repair = serde_json::to_value(&document)
        .map(|normalized| normalized != value)
        .unwrap_or(true);

    Some(DecodedGoals::Decoded {
        document,
        needs_repair,
    })
}

fn fenced_body(text: &str) -> Option<&str> {
    let open = text.find(FENCE)?;
    let after_open = &text[open + FENCE.len()..];
    // Skip the info string (`json`) up to the end of the opening line.
    let body_start = after_open.find('\n').map(|index| index + 1)?;
    let body = &after_open[body_start..];
    let close = body.find(FENCE)?;
    Some(body[..close].trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::GoalEntry;

    fn sample() -> GoalsDocument {
        let mut document = GoalsDocument::default();
        document.goals.insert(
            "12".to_string(),
            GoalEntry {
                text: "Ship the beta".to_string(),
                image: "🚀".to_string(),
                label: "Focus".to_string(),
                hidden: false,
                completed: true,
            },
        );
        document
    }

    #[test]
    fn encoded_comment_decodes_to_the_same_document() {
        let encoded = encode_goals_comment(&sample()).expect("encode");
        assert!(encoded.starts_with(GOALS_MARKER));

        let decoded = decode_goals_comment(&encoded).expect("marker present");
        assert_eq!(
            decoded,
            DecodedGoals::Decoded {
                document: sample(),
                needs_repair: false,
            }
        );
    }

    #[test]
    fn tolerates_bom_and_surrounding_text() {
        let content = format!(
            "\u{feff}Notes for me\n{GOALS_MARKER}\n```json\n{{\"version\":1,\"goals\":{{}}}}\n```\ntrailing words"
        );
        assert!(has_goals_marker(&content));
        assert!(matches!(
            decode_goals_comment(&content),
            Some(DecodedGoals::Decoded { needs_repair: false, .. })
        ));
    }

    #[test]
    fn missing_fields_request_a_repair() {
        let content = format!("{GOALS_MARKER}\n```json\n{{\"goals\":{{\"3\":{{\"text\":\"x\"}}}}}}\n```");
        let Some(DecodedGoals::Decoded {
            document,
            needs_repair,
        }) = decode_goals_comment(&content)
        else {
            panic!("expected decoded document");
        };
        assert!(needs_repair);
        assert_eq!(document.goals["3"].text, "x");
    }

    #[test]
    fn distinguishes_unfenced_malformed_and_unmarked_comments() {
        assert_eq!(
            decode_goals_comment(&format!("{GOALS_MARKER} but no block")),
            Some(DecodedGoals::NoFence)
        );
        assert!(matches!(
            decode_goals_comment(&format!("{GOALS_MARKER}\n```json\n{{not json\n```")),
            Some(DecodedGoals::Malformed(_))
        ));
        assert_eq!(decode_goals_comment("just a comment"), None);
        assert!(!has_goals_marker("just a comment"));
    }
}
