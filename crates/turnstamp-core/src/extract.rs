use crate::model::transcript::SEPARATOR;
use crate::model::{normalize, Role, Turn, TurnHeader};

/// Extract every turn that has content, in transcript order.
///
/// A turn's fingerprint is the first line after its header that is neither
/// blank nor a bare `---` separator, scanning to the end of the text. That
/// line may itself be a later header. A header with nothing after it, or
/// whose fingerprint would repeat its own text, yields no turn.
pub fn extract_turns(text: &str) -> Vec<Turn> {
    let text = normalize(text);
    let lines: Vec<&str> = text.lines().collect();
    let mut turns = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let Some(header) = TurnHeader::parse(line) else {
            continue;
        };
        match fingerprint_after(&lines[index + 1..]) {
            Some(fingerprint) if fingerprint != line.trim() => turns.push(Turn {
                header_index: index,
                role: header.role,
                fingerprint: fingerprint.to_string(),
            }),
            _ => {}
        }
    }

    turns
}

fn fingerprint_after<'a>(following: &[&'a str]) -> Option<&'a str> {
    following
        .iter()
        .map(|line| line.trim())
        .find(|content| !content.is_empty() && *content != SEPARATOR)
}

/// Whether at least one user turn carries dialogue of its own, not just the
/// header of the turn that follows.
pub fn has_user_content(turns: &[Turn]) -> bool {
    turns
        .iter()
        .any(|t| t.role == Role::User && TurnHeader::parse(&t.fingerprint).is_none())
}
