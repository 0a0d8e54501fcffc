//! CSS selector subset used by site schemas.
//!
//! Supported: selector lists, descendant and child combinators, type and
//! universal selectors, `#id`, `.class`, attribute tests (`[a]`, `=`, `^=`,
//! `*=`, `$=`) and `:not(<compound>)`.

use super::{NodeId, Page};
use crate::error::SelectorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Vec<Part>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// A compound plus its relation to the part on its left.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Part {
    combinator: Combinator,
    compound: Compound,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    tests: Vec<Test>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Test {
    Id(String),
    Class(String),
    Attr {
        name: String,
        op: AttrOp,
        value: String,
    },
    Not(Compound),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Prefix,
    Contains,
    Suffix,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let mut alternatives = Vec::new();
        for alt in split_top_level(source) {
            let alt = alt.trim();
            if alt.is_empty() {
                return Err(error(source, "empty selector in list"));
            }
            alternatives.push(parse_complex(source, alt)?);
        }
        if alternatives.is_empty() {
            return Err(error(source, "empty selector"));
        }
        Ok(Self {
            source: source.to_string(),
            alternatives,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, page: &Page, node: NodeId) -> bool {
        page.is_element(node)
            && self
                .alternatives
                .iter()
                .any(|parts| match_parts(page, node, parts))
    }
}

fn error(selector: &str, reason: &str) -> SelectorError {
    SelectorError {
        selector: selector.to_string(),
        reason: reason.to_string(),
    }
}

fn split_top_level(source: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in source.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '[') | (None, '(') => depth += 1,
            (None, ']') | (None, ')') => depth -= 1,
            (None, ',') if depth == 0 => {
                out.push(&source[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&source[start..]);
    out
}

fn parse_complex(source: &str, text: &str) -> Result<Vec<Part>, SelectorError> {
    let chars: Vec<char> = text.chars().collect();
    let mut pos = 0;
    let mut parts = Vec::new();
    let mut pending = Combinator::Descendant;
    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            pos += 1;
            continue;
        }
        if c == '>' {
            if parts.is_empty() {
                return Err(error(source, "leading child combinator"));
            }
            pending = Combinator::Child;
            pos += 1;
            continue;
        }
        let compound = parse_compound(source, &chars, &mut pos)?;
        parts.push(Part {
            combinator: pending,
            compound,
        });
        pending = Combinator::Descendant;
    }
    if parts.is_empty() || pending == Combinator::Child {
        return Err(error(source, "dangling combinator"));
    }
    Ok(parts)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn read_ident(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}

fn parse_compound(
    source: &str,
    chars: &[char],
    pos: &mut usize,
) -> Result<Compound, SelectorError> {
    let mut compound = Compound::default();
    let start = *pos;
    if *pos < chars.len() && chars[*pos] == '*' {
        *pos += 1;
    } else if *pos < chars.len() && is_ident_char(chars[*pos]) {
        compound.tag = Some(read_ident(chars, pos).to_ascii_lowercase());
    }
    while *pos < chars.len() {
        match chars[*pos] {
            '#' => {
                *pos += 1;
                let id = read_ident(chars, pos);
                if id.is_empty() {
                    return Err(error(source, "empty id selector"));
                }
                compound.tests.push(Test::Id(id));
            }
            '.' => {
                *pos += 1;
                let class = read_ident(chars, pos);
                if class.is_empty() {
                    return Err(error(source, "empty class selector"));
                }
                compound.tests.push(Test::Class(class));
            }
            '[' => {
                *pos += 1;
                compound.tests.push(parse_attr(source, chars, pos)?);
            }
            ':' => {
                *pos += 1;
                let name = read_ident(chars, pos);
                if name != "not" || chars.get(*pos) != Some(&'(') {
                    return Err(error(source, "only :not(...) is supported"));
                }
                *pos += 1;
                while chars.get(*pos).map_or(false, |c| c.is_whitespace()) {
                    *pos += 1;
                }
                let inner = parse_compound(source, chars, pos)?;
                while chars.get(*pos).map_or(false, |c| c.is_whitespace()) {
                    *pos += 1;
                }
                if chars.get(*pos) != Some(&')') {
                    return Err(error(source, "unterminated :not("));
                }
                *pos += 1;
                compound.tests.push(Test::Not(inner));
            }
            _ => break,
        }
    }
    if *pos == start {
        return Err(error(
            source,
            &format!("unexpected character '{}'", chars[start]),
        ));
    }
    Ok(compound)
}

fn parse_attr(source: &str, chars: &[char], pos: &mut usize) -> Result<Test, SelectorError> {
    let skip_ws = |pos: &mut usize| {
        while chars.get(*pos).map_or(false, |c| c.is_whitespace()) {
            *pos += 1;
        }
    };
    skip_ws(pos);
    let name = read_ident(chars, pos).to_ascii_lowercase();
    if name.is_empty() {
        return Err(error(source, "empty attribute name"));
    }
    skip_ws(pos);
    let op = match chars.get(*pos) {
        Some(']') => {
            *pos += 1;
            return Ok(Test::Attr {
                name,
                op: AttrOp::Exists,
                value: String::new(),
            });
        }
        Some('=') => {
            *pos += 1;
            AttrOp::Equals
        }
        Some(c @ ('^' | '*' | '$')) if chars.get(*pos + 1) == Some(&'=') => {
            let op = match c {
                '^' => AttrOp::Prefix,
                '*' => AttrOp::Contains,
                _ => AttrOp::Suffix,
            };
            *pos += 2;
            op
        }
        _ => return Err(error(source, "unsupported attribute operator")),
    };
    skip_ws(pos);
    let value = match chars.get(*pos) {
        Some(&q @ ('"' | '\'')) => {
            *pos += 1;
            let start = *pos;
            while *pos < chars.len() && chars[*pos] != q {
                *pos += 1;
            }
            if *pos >= chars.len() {
                return Err(error(source, "unterminated string"));
            }
            let v: String = chars[start..*pos].iter().collect();
            *pos += 1;
            v
        }
        _ => read_ident(chars, pos),
    };
    skip_ws(pos);
    if chars.get(*pos) != Some(&']') {
        return Err(error(source, "unterminated attribute selector"));
    }
    *pos += 1;
    Ok(Test::Attr { name, op, value })
}

fn match_parts(page: &Page, node: NodeId, parts: &[Part]) -> bool {
    let Some((last, rest)) = parts.split_last() else {
        return false;
    };
    if !last.compound.matches(page, node) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }
    match last.combinator {
        Combinator::Child => page
            .parent_element(node)
            .map_or(false, |p| match_parts(page, p, rest)),
        Combinator::Descendant => {
            let mut cur = page.parent_element(node);
            while let Some(p) = cur {
                if match_parts(page, p, rest) {
                    return true;
                }
                cur = page.parent_element(p);
            }
            false
        }
    }
}

impl Compound {
    fn matches(&self, page: &Page, node: NodeId) -> bool {
        if !page.is_element(node) {
            return false;
        }
        if let Some(tag) = &self.tag {
            if page.tag(node) != Some(tag.as_str()) {
                return false;
            }
        }
        self.tests.iter().all(|t| t.matches(page, node))
    }
}

impl Test {
    fn matches(&self, page: &Page, node: NodeId) -> bool {
        match self {
            Test::Id(id) => page.attr(node, "id") == Some(id.as_str()),
            Test::Class(class) => page.has_class(node, class),
            Test::Attr { name, op, value } => match page.attr(node, name) {
                None => false,
                Some(actual) => match op {
                    AttrOp::Exists => true,
                    AttrOp::Equals => actual == value,
                    AttrOp::Prefix => !value.is_empty() && actual.starts_with(value.as_str()),
                    AttrOp::Contains => !value.is_empty() && actual.contains(value.as_str()),
                    AttrOp::Suffix => !value.is_empty() && actual.ends_with(value.as_str()),
                },
            },
            Test::Not(inner) => !inner.matches(page, node),
        }
    }
}
