//! Sender filter: messages from ignored sender ids are never relayed.

use std::collections::HashSet;

/// Case-insensitive set of sender ids to suppress.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    ignored: HashSet<String>,
}

impl UserFilter {
    pub fn new<I, S>(ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ignored = ignored
            .into_iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { ignored }
    }

    /// Parse a comma-separated list (e.g. the IGNORED_SENDER_IDS value).
    pub fn from_list(list: &str) -> Self {
        Self::new(list.split(','))
    }

    /// True when messages from this sender must be dropped.
    pub fn suppresses(&self, sender_id: &str) -> bool {
        !self.ignored.is_empty() && self.ignored.contains(&sender_id.trim().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_listed_ids_case_insensitively() {
        let f = UserFilter::from_list("1, Bot-A ,3");
        assert!(f.suppresses("1"));
        assert!(f.suppresses("3"));
        assert!(f.suppresses("bot-a"));
        assert!(f.suppresses("BOT-A"));
        assert!(!f.suppresses("2"));
    }

    #[test]
    fn empty_list_suppresses_nothing() {
        let f = UserFilter::from_list(" , ,");
        assert!(!f.suppresses(""));
        assert!(!f.suppresses("1"));
    }
}
