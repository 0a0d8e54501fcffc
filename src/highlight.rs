//! Keyword highlighting inside post messages.

use crate::config::HighlightSettings;
use crate::dom::{NodeId, Page};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Marks a post as already scanned.
pub const HIGHLIGHTED_ATTR: &str = "data-archlink-highlighted";
pub const HIGHLIGHTED_CLASS: &str = "archlink-highlighted";
pub const KEYWORD_CLASS: &str = "archlink-keyword";

pub const DEFAULT_COLOR: &str = "#ffff00";

lazy_static! {
    static ref COLOR_REGEX: Regex = Regex::new(
        r"^(?:#(?:[0-9a-fA-F]{3,4}|[0-9a-fA-F]{6}|[0-9a-fA-F]{8})|[a-zA-Z]+|rgba?\(\s*[0-9.%,\s]+\))$"
    )
    .unwrap();
}

/// A keyword and the background color used for its matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keyword: String,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

impl KeywordRule {
    pub fn new(keyword: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            color: color.into(),
        }
    }

    /// Parse `word1:color1,word2` into rules; missing colors default to yellow.
    pub fn parse_list(s: &str) -> Vec<Self> {
        s.split(',')
            .filter_map(|item| {
                let (keyword, color) = match item.split_once(':') {
                    Some((k, c)) => (k.trim(), c.trim()),
                    None => (item.trim(), ""),
                };
                if keyword.is_empty() {
                    return None;
                }
                let color = if color.is_empty() { DEFAULT_COLOR } else { color };
                Some(Self::new(keyword, color))
            })
            .collect()
    }
}

/// Accepts hex colors, named colors and `rgb()`/`rgba()`.
pub fn is_valid_color(color: &str) -> bool {
    COLOR_REGEX.is_match(color.trim())
}

/// Compiled keyword matcher.
#[derive(Debug, Clone)]
pub struct Highlighter {
    rules: Vec<KeywordRule>,
    /// Rule index for each capture group, longest keyword first.
    groups: Vec<usize>,
    pattern: Option<Regex>,
}

impl Highlighter {
    pub fn new(rules: &[KeywordRule]) -> Self {
        let rules: Vec<KeywordRule> = rules
            .iter()
            .filter(|r| !r.keyword.trim().is_empty())
            .filter(|r| {
                let valid = is_valid_color(&r.color);
                if !valid {
                    warn!(keyword = %r.keyword, color = %r.color, "Keyword color rejected");
                }
                valid
            })
            .cloned()
            .collect();
        if rules.is_empty() {
            return Self::disabled();
        }
        // Leftmost-first alternation: a longer keyword must come before its prefixes.
        let mut groups: Vec<usize> = (0..rules.len()).collect();
        groups.sort_by_key(|&i| std::cmp::Reverse(rules[i].keyword.trim().len()));
        let alternatives: Vec<String> = groups
            .iter()
            .map(|&i| format!("({})", regex::escape(rules[i].keyword.trim())))
            .collect();
        let source = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
        match Regex::new(&source) {
            Ok(pattern) => Self {
                rules,
                groups,
                pattern: Some(pattern),
            },
            Err(e) => {
                warn!(error = %e, "Keyword pattern rejected, highlighting disabled");
                Self::disabled()
            }
        }
    }

    pub fn from_settings(settings: &HighlightSettings) -> Self {
        if settings.enabled {
            Self::new(&settings.keywords)
        } else {
            Self::disabled()
        }
    }

    pub fn disabled() -> Self {
        Self {
            rules: Vec::new(),
            groups: Vec::new(),
            pattern: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.pattern.is_some()
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    /// Byte ranges of keyword hits in `text` with the index of the matching rule.
    pub fn find(&self, text: &str) -> Vec<(std::ops::Range<usize>, usize)> {
        let Some(pattern) = &self.pattern else {
            return Vec::new();
        };
        pattern
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let group = (1..caps.len()).find(|&i| caps.get(i).is_some())?;
                Some((whole.range(), self.groups[group - 1]))
            })
            .collect()
    }

    /// Wrap keyword hits under `message` in colored spans.
    ///
    /// Returns the matched keywords. A post is scanned at most once.
    pub fn highlight_post(
        &self,
        page: &mut Page,
        post: NodeId,
        message: Option<NodeId>,
    ) -> Vec<String> {
        if !self.is_active() || page.attr(post, HIGHLIGHTED_ATTR).is_some() {
            return Vec::new();
        }
        page.set_attr(post, HIGHLIGHTED_ATTR, "true");
        let Some(message) = message else {
            return Vec::new();
        };

        let text_nodes: Vec<NodeId> = page
            .descendants(message)
            .into_iter()
            .filter(|&n| page.text(n).is_some() && !self.inside_highlight(page, n, message))
            .collect();

        let mut matched: Vec<String> = Vec::new();
        for node in text_nodes {
            let content = page.text(node).unwrap_or_default().to_string();
            let hits = self.find(&content);
            if hits.is_empty() {
                continue;
            }
            let mut last = 0;
            for (range, rule_index) in hits {
                let rule = &self.rules[rule_index];
                if range.start > last {
                    let before = page.create_text(&content[last..range.start]);
                    page.insert_before(node, before);
                }
                let span = page.create_element("span");
                page.set_attr(span, "class", KEYWORD_CLASS);
                page.set_attr(span, "data-keyword", &rule.keyword);
                page.set_attr(span, "style", &format!("background-color: {}", rule.color));
                let inner = page.create_text(&content[range.clone()]);
                page.append_child(span, inner);
                page.insert_before(node, span);
                if !matched.contains(&rule.keyword) {
                    matched.push(rule.keyword.clone());
                }
                last = range.end;
            }
            if last < content.len() {
                let rest = page.create_text(&content[last..]);
                page.insert_before(node, rest);
            }
            page.remove(node);
        }

        if !matched.is_empty() {
            page.add_class(post, HIGHLIGHTED_CLASS);
            debug!(post, keywords = ?matched, "Highlighted keywords");
        }
        matched
    }

    fn inside_highlight(&self, page: &Page, node: NodeId, stop: NodeId) -> bool {
        let mut cur = page.parent(node);
        while let Some(n) = cur {
            if n == stop {
                return false;
            }
            if page.has_class(n, KEYWORD_CLASS) {
                return true;
            }
            cur = page.parent(n);
        }
        false
    }
}
