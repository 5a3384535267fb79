use serde::{Deserialize, Serialize};

use super::stamp;

const HEADER_OPEN: &str = "_**";
const HEADER_CLOSE: &str = "**_";

/// A bare horizontal rule between turns.
pub const SEPARATOR: &str = "---";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
}

/// A turn header line such as `_**User**_` or `_**Agent (model x, mode Ask)**_`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnHeader<'a> {
    pub role: Role,
    /// Text between the delimiters.
    pub label: &'a str,
}

impl<'a> TurnHeader<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        let label = line
            .strip_prefix(HEADER_OPEN)?
            .strip_suffix(HEADER_CLOSE)?;
        let role = if label.starts_with("User") {
            Role::User
        } else if label.contains("User") || label.contains("Agent") {
            Role::Agent
        } else {
            return None;
        };
        Some(Self { role, label })
    }

    /// The label without a timestamp suffix added by a previous merge.
    pub fn bare_label(&self) -> &'a str {
        if let Some(open) = self.label.rfind(" (") {
            let suffix = &self.label[open + 2..];
            if let Some(inner) = suffix.strip_suffix(')') {
                if stamp::is_display(inner) {
                    return &self.label[..open];
                }
            }
        }
        self.label
    }

    /// Render this header carrying `display` as its timestamp.
    pub fn stamped(&self, display: &str) -> String {
        format!("{HEADER_OPEN}{} ({display}){HEADER_CLOSE}", self.bare_label())
    }
}

/// A header plus the first meaningful line that follows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Zero-based line index of the header in the normalized transcript.
    pub header_index: usize,
    pub role: Role,
    pub fingerprint: String,
}

/// Normalize `\r\n` and lone `\r` line endings to `\n`.
pub fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers() {
        let user = TurnHeader::parse("_**User**_").unwrap();
        assert_eq!(user.role, Role::User);
        assert_eq!(user.label, "User");

        let agent = TurnHeader::parse("_**Agent (model claude-4-sonnet, mode Agent)**_").unwrap();
        assert_eq!(agent.role, Role::Agent);

        assert!(TurnHeader::parse("_**Note**_").is_none());
        assert!(TurnHeader::parse("**User**").is_none());
        assert!(TurnHeader::parse("_**User").is_none());
        assert!(TurnHeader::parse(" _**User**_").is_none());
    }

    #[test]
    fn test_stamped_header() {
        let header = TurnHeader::parse("_**Agent (model o3, mode Ask)**_").unwrap();
        assert_eq!(
            header.stamped("2025-01-02 03:04:05 UTC"),
            "_**Agent (model o3, mode Ask) (2025-01-02 03:04:05 UTC)**_"
        );
    }

    #[test]
    fn test_restamp_replaces_previous_timestamp() {
        let line = "_**User (2025-01-02 03:04:05 UTC)**_";
        let header = TurnHeader::parse(line).unwrap();
        assert_eq!(header.role, Role::User);
        assert_eq!(header.bare_label(), "User");
        assert_eq!(header.stamped("2025-01-02 03:04:05 UTC"), line);
    }

    #[test]
    fn test_normalize_line_endings() {
        assert_eq!(normalize("a\r\nb\rc\n"), "a\nb\nc\n");
    }
}
