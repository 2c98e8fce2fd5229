//! Browser / OS extraction from a request's user-agent string.

use regex::Regex;
use std::sync::OnceLock;

/// Client details derived from a user-agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub browser: Option<String>,
    pub os: Option<String>,
}

struct Rule {
    pattern: Regex,
    name: &'static str,
}

// First match wins, so the more specific tokens come first
// (Edge and Opera also carry "Chrome/", Chrome also carries "Safari/").
const BROWSER_RULES: &[(&str, &str)] = &[
    (r"Edg(?:e|A|iOS)?/(\d+)", "Edge"),
    (r"(?:OPR|Opera)/(\d+)", "Opera"),
    (r"SamsungBrowser/(\d+)", "Samsung Internet"),
    (r"(?:Firefox|FxiOS)/(\d+)", "Firefox"),
    (r"(?:Chrome|CriOS)/(\d+)", "Chrome"),
    (r"Version/(\d+)[\d.]* (?:Mobile/\S+ )?Safari/", "Safari"),
    (r"(?:MSIE |Trident/.*rv:)(\d+)", "Internet Explorer"),
];

const OS_RULES: &[(&str, &str)] = &[
    (r"Windows NT 10\.0", "Windows 10"),
    (r"Windows NT 6\.3", "Windows 8.1"),
    (r"Windows NT 6\.2", "Windows 8"),
    (r"Windows NT 6\.1", "Windows 7"),
    (r"Windows", "Windows"),
    (r"Android (\d+)", "Android"),
    (r"(?:iPhone|CPU) OS (\d+)", "iOS"),
    (r"iPad", "iPadOS"),
    (r"Mac OS X", "macOS"),
    (r"CrOS", "ChromeOS"),
    (r"Linux", "Linux"),
];

fn compile(rules: &[(&str, &'static str)]) -> Vec<Rule> {
    rules
        .iter()
        .filter_map(|&(pattern, name)| {
            Regex::new(pattern).ok().map(|pattern| Rule { pattern, name })
        })
        .collect()
}

fn browser_rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| compile(BROWSER_RULES))
}

fn os_rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| compile(OS_RULES))
}

fn first_match(rules: &[Rule], user_agent: &str) -> Option<String> {
    rules.iter().find_map(|rule| {
        rule.pattern.captures(user_agent).map(|caps| match caps.get(1) {
            Some(version) => format!("{} {}", rule.name, version.as_str()),
            None => rule.name.to_string(),
        })
    })
}

impl ClientInfo {
    pub fn parse(user_agent: &str) -> Self {
        let user_agent = user_agent.trim();
        if user_agent.is_empty() {
            return Self::default();
        }

        Self {
            browser: first_match(browser_rules(), user_agent),
            os: first_match(os_rules(), user_agent),
        }
    }
}
