//! Keyword-based application categories.
//!
//! Categories are tested in table order and the first one with a matching
//! keyword wins, so an application listed under two categories (Slack is both
//! "work" and "communication") always resolves to the earlier one.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::ValidationError;

/// Category id used when no keyword matches.
pub const OTHER_CATEGORY: &str = "other";

const OTHER_DISPLAY_NAME: &str = "Other";

/// One entry of the category table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Stable id stored with every usage segment.
    pub id: String,
    /// Human-readable name for reports.
    pub name: String,
    /// Substrings matched against the lowercase app name, executable and title.
    pub keywords: Vec<String>,
}

impl Category {
    fn new(id: &str, name: &str, keywords: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        }
    }
}

/// Ordered, validated category table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTable {
    categories: Vec<Category>,
}

impl CategoryTable {
    /// Validates a table. Keywords are lowercased and empty keywords dropped.
    pub fn new(categories: Vec<Category>) -> Result<Self, ValidationError> {
        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(categories.len());
        for mut category in categories {
            if category.id.is_empty() {
                return Err(ValidationError::Empty {
                    field: "category id",
                });
            }
            if category.id == OTHER_CATEGORY {
                return Err(ValidationError::ReservedCategory { id: category.id });
            }
            if !seen.insert(category.id.clone()) {
                return Err(ValidationError::DuplicateCategory { id: category.id });
            }
            category.keywords = category
                .keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
            normalized.push(category);
        }
        Ok(Self {
            categories: normalized,
        })
    }

    /// The built-in table.
    pub fn builtin() -> Self {
        Self {
            categories: builtin_categories(),
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Returns the id of the first category with a keyword found in any field.
    pub fn categorize(&self, app_name: &str, exe_name: &str, title: &str) -> &str {
        let haystack = format!("{app_name} {exe_name} {title}").to_lowercase();
        self.categories
            .iter()
            .find(|category| {
                category
                    .keywords
                    .iter()
                    .any(|keyword| haystack.contains(keyword.as_str()))
            })
            .map_or(OTHER_CATEGORY, |category| category.id.as_str())
    }

    /// Display name for a category id, falling back to "Other".
    pub fn display_name(&self, id: &str) -> &str {
        self.categories
            .iter()
            .find(|category| category.id == id)
            .map_or(OTHER_DISPLAY_NAME, |category| category.name.as_str())
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[expect(
    clippy::too_many_lines,
    reason = "static keyword data reads best as one table"
)]
fn builtin_categories() -> Vec<Category> {
    vec![
        Category::new(
            "work",
            "Work",
            &[
                "code", "visual studio", "vscode", "pycharm", "intellij", "eclipse", "rider",
                "webstorm", "phpstorm", "goland", "clion", "datagrip", "android studio",
                "word", "excel", "powerpoint", "outlook", "teams", "onenote", "libreoffice",
                "slack", "notion", "jira", "confluence", "figma", "sketch", "adobe xd",
                "sublime", "notepad++", "atom", "vim", "neovim", "emacs", "zed",
                "photoshop", "illustrator", "indesign", "premiere", "after effects",
                "blender", "unity", "unreal", "godot", "autocad", "solidworks",
                "postman", "insomnia", "dbeaver", "mysql workbench", "pgadmin",
                "git", "github desktop", "sourcetree", "gitkraken",
                "terminal", "iterm", "alacritty", "wezterm", "kitty", "warp", "powershell",
                "docker", "kubernetes", "vagrant", "virtualbox", "vmware",
                "trello", "asana", "clickup", "basecamp", "linear",
                "miro", "lucidchart", "draw.io",
                "1password", "bitwarden", "keepass",
                "calendar", "todoist", "ticktick", "omnifocus",
            ],
        ),
        Category::new(
            "entertainment",
            "Entertainment",
            &[
                "steam", "epic games", "battle.net", "gog", "ubisoft", "ea app",
                "riot", "valorant", "league of legends", "dota", "counter-strike", "cs2",
                "minecraft", "fortnite", "overwatch", "genshin", "roblox",
                "vlc", "spotify", "netflix", "youtube", "twitch",
                "media player", "itunes", "foobar", "musicbee", "aimp",
                "plex", "kodi", "jellyfin", "stremio",
                "disney+", "hbo", "prime video", "hulu", "crunchyroll",
                "mpv", "potplayer", "mpc-hc",
                "audacity", "ableton", "fl studio", "logic pro", "garageband", "reaper",
                "obs studio", "streamlabs",
                "retroarch", "dolphin", "pcsx2", "rpcs3",
                "playnite", "xbox", "playstation", "geforce now",
            ],
        ),
        Category::new(
            "communication",
            "Communication",
            &[
                "telegram", "whatsapp", "viber", "discord", "skype", "signal", "element",
                "zoom", "google meet", "webex",
                "messenger", "vkontakte", "facebook", "twitter", "x.com",
                "instagram", "tiktok", "reddit", "mastodon",
                "mail", "почта", "gmail", "thunderbird", "mailspring",
                "mattermost", "rocket.chat", "zulip", "linkedin",
            ],
        ),
        Category::new(
            "browsers",
            "Browsers",
            &[
                "chrome", "firefox", "mozilla", "opera", "edge", "safari",
                "yandex", "яндекс браузер", "brave", "vivaldi", "tor browser",
                "chromium", "librewolf", "waterfox", "qutebrowser",
            ],
        ),
        Category::new(
            "system",
            "System",
            &[
                "explorer", "проводник", "finder", "nautilus", "dolphin",
                "task manager", "диспетчер", "taskmgr", "system monitor", "activity monitor",
                "settings", "параметры", "control panel", "панель управления",
                "regedit", "services", "notepad", "блокнот", "calculator", "калькулятор",
                "snipping tool", "paint", "total commander", "far manager",
                "7-zip", "winrar", "ccleaner", "hwinfo", "cpu-z",
                "windows update", "defender", "firewall",
            ],
        ),
        Category::new(
            "development",
            "Development",
            &[
                "github", "gitlab", "bitbucket", "jenkins",
                "node", "npm", "yarn", "pnpm", "deno",
                "python", "jupyter", "spyder",
                "java", "maven", "gradle",
                "dotnet", "nuget", "msbuild",
                "ruby", "rails", "php", "composer", "laravel",
                "rust", "cargo", "golang",
                "kotlin", "scala", "elixir", "erlang",
                "swift", "xcode", "flutter", "dart",
                "webpack", "vite", "eslint", "typescript",
            ],
        ),
        Category::new(
            "productivity",
            "Productivity",
            &[
                "obsidian", "logseq", "remnote", "evernote", "bear", "simplenote",
                "google docs", "google sheets", "google slides", "google drive",
                "dropbox", "onedrive", "icloud",
                "coda", "airtable", "pocket", "raindrop",
                "grammarly", "languagetool", "deepl", "translate",
                "pdf", "acrobat", "foxit", "sumatra", "okular",
                "calibre", "kindle",
            ],
        ),
    ]
}
