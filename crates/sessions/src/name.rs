use std::fmt;

use serde::{Deserialize, Serialize};

/// Registry key of a session. Names are case-insensitive, so they are
/// lowercased once at construction and compared verbatim afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SessionName(String);

impl SessionName {
    pub fn new(raw: &str) -> Self {
        Self(raw.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionName {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<SessionName> for String {
    fn from(name: SessionName) -> Self {
        name.0
    }
}

impl AsRef<str> for SessionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case() {
        assert_eq!(SessionName::new("Sales-EU"), SessionName::new("sales-eu"));
        assert_eq!(SessionName::new("Sales-EU").as_str(), "sales-eu");
    }

    #[test]
    fn deserializing_normalizes_too() {
        let name: SessionName = serde_json::from_str("\"MAIN\"").unwrap();
        assert_eq!(name.to_string(), "main");
    }
}
