//! Window title privacy filtering.
//!
//! Titles pass through [`PrivacyFilter::process_title`] before they are stored
//! or displayed. The blacklist check runs first and wins over every mode.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::PrivacyMode;

/// Placeholder for redacted email addresses.
pub const EMAIL_PLACEHOLDER: &str = "[email]";
/// Placeholder for redacted phone numbers.
pub const PHONE_PLACEHOLDER: &str = "[phone]";
/// Placeholder for redacted card numbers.
pub const CARD_PLACEHOLDER: &str = "[card]";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.-]+@[\w.-]+\.\w+").expect("valid email regex"));

// Cards are masked before phones so a 16-digit run is not half-eaten by the
// phone pattern.
static CARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}").expect("valid card regex")
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d{10,12}").expect("valid phone regex"));

/// Applies the configured privacy mode and blacklist to window titles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivacyFilter {
    mode: PrivacyMode,
    blacklist: Vec<String>,
}

impl PrivacyFilter {
    /// Creates a filter. Blacklist entries are matched case-insensitively.
    pub fn new(mode: PrivacyMode, blacklist: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let blacklist = blacklist
            .into_iter()
            .map(|entry| entry.as_ref().to_lowercase())
            .filter(|entry| !entry.is_empty())
            .collect();
        Self { mode, blacklist }
    }

    /// Returns `true` when the title contains a blacklisted substring.
    pub fn is_blacklisted(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.blacklist
            .iter()
            .any(|blocked| title.contains(blocked.as_str()))
    }

    /// Returns a title that is safe to persist.
    pub fn process_title(&self, title: &str, app_name: &str) -> String {
        if self.is_blacklisted(title) {
            return format!("[{app_name}]");
        }
        match self.mode {
            PrivacyMode::Anonymous => app_name.to_string(),
            PrivacyMode::Masked => mask_sensitive(title),
            PrivacyMode::Full => title.to_string(),
        }
    }
}

/// Replaces emails, card numbers and phone numbers with placeholders.
pub fn mask_sensitive(title: &str) -> String {
    let masked = EMAIL_RE.replace_all(title, EMAIL_PLACEHOLDER);
    let masked = CARD_RE.replace_all(&masked, CARD_PLACEHOLDER);
    PHONE_RE.replace_all(&masked, PHONE_PLACEHOLDER).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(mode: PrivacyMode) -> PrivacyFilter {
        PrivacyFilter::new(mode, ["Password", "Bank"])
    }

    #[test]
    fn blacklist_wins_over_every_mode() {
        for mode in [PrivacyMode::Full, PrivacyMode::Masked, PrivacyMode::Anonymous] {
            assert_eq!(
                filter(mode).process_title("Enter your PASSWORD", "Chrome"),
                "[Chrome]",
                "mode {mode}"
            );
            assert_eq!(
                filter(mode).process_title("My bank account", "Firefox"),
                "[Firefox]",
                "mode {mode}"
            );
        }
    }

    #[test]
    fn anonymous_mode_returns_app_name() {
        assert_eq!(
            filter(PrivacyMode::Anonymous).process_title("Inbox - user@example.com", "Thunderbird"),
            "Thunderbird"
        );
    }

    #[test]
    fn full_mode_keeps_title() {
        assert_eq!(
            filter(PrivacyMode::Full).process_title("Inbox - user@example.com", "Thunderbird"),
            "Inbox - user@example.com"
        );
    }

    #[test]
    fn masked_mode_redacts_email_only() {
        assert_eq!(
            filter(PrivacyMode::Masked).process_title("Inbox - user@example.com - Mail", "Mail"),
            "Inbox - [email] - Mail"
        );
    }

    #[test]
    fn masked_mode_redacts_phones_and_cards() {
        assert_eq!(
            mask_sensitive("Call +79161234567 today"),
            "Call [phone] today"
        );
        assert_eq!(
            mask_sensitive("Card 4111 1111 1111 1111 saved"),
            "Card [card] saved"
        );
        assert_eq!(mask_sensitive("Card 4111111111111111"), "Card [card]");
    }

    #[test]
    fn masked_mode_leaves_short_numbers() {
        assert_eq!(
            mask_sensitive("Issue #4521 - build 2024"),
            "Issue #4521 - build 2024"
        );
    }

    #[test]
    fn empty_blacklist_entries_are_ignored() {
        let filter = PrivacyFilter::new(PrivacyMode::Full, ["", "secret"]);
        assert!(!filter.is_blacklisted("anything"));
        assert!(filter.is_blacklisted("Top SECRET plans"));
    }
}
