//! Compound structural selectors.
//!
//! Only the compound subset hosts are required to understand is supported:
//! an optional tag (or `*`) followed by any number of `.class`, `#id`,
//! `[attr]` and `[attr="value"]` parts. Combinators and selector lists are
//! rejected at parse time so a bad selector surfaces as a configuration error
//! rather than an empty result mid-run.

use std::fmt;
use std::iter::Peekable;
use std::str::{Chars, FromStr};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,

    #[error("invalid selector '{input}': {reason}")]
    Invalid { input: String, reason: String },
}

/// View of an element a [`Selector`] can be matched against.
pub trait ElementLike {
    fn tag_name(&self) -> &str;

    fn attribute(&self, name: &str) -> Option<&str>;

    fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttributeMatch {
    pub name: String,
    /// `None` matches on presence alone.
    pub value: Option<String>,
}

#[cfg_attr(
    feature = "serde-full",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Selector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<AttributeMatch>,
}

impl Selector {
    /// Matches every element.
    pub fn universal() -> Self {
        Self::default()
    }

    pub fn tag(name: impl Into<String>) -> Self {
        Self {
            tag: Some(name.into().to_ascii_lowercase()),
            ..Self::default()
        }
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.attributes.push(AttributeMatch {
            name: name.into().to_ascii_lowercase(),
            value: value.map(str::to_string),
        });
        self
    }

    pub fn is_universal(&self) -> bool {
        self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attributes.is_empty()
    }

    pub fn tag_name(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn id_value(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn attributes(&self) -> &[AttributeMatch] {
        &self.attributes
    }

    pub fn matches<E: ElementLike + ?Sized>(&self, element: &E) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag_name().eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.attribute("id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|class| element.has_class(class)) {
            return false;
        }
        self.attributes.iter().all(|attr| match &attr.value {
            Some(expected) => element.attribute(&attr.name) == Some(expected.as_str()),
            None => element.attribute(&attr.name).is_some(),
        })
    }

    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let source = input.trim();
        if source.is_empty() {
            return Err(SelectorError::Empty);
        }
        let invalid = |reason: String| SelectorError::Invalid {
            input: source.to_string(),
            reason,
        };

        let mut selector = Selector::default();
        let mut chars = source.chars().peekable();

        match chars.peek() {
            Some(&'*') => {
                chars.next();
            }
            Some(&c) if is_ident_char(c) => {
                selector.tag = Some(take_ident(&mut chars).to_ascii_lowercase());
            }
            _ => {}
        }

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    let class = take_ident(&mut chars);
                    if class.is_empty() {
                        return Err(invalid("expected class name after '.'".to_string()));
                    }
                    selector.classes.push(class);
                }
                '#' => {
                    let id = take_ident(&mut chars);
                    if id.is_empty() {
                        return Err(invalid("expected id after '#'".to_string()));
                    }
                    if selector.id.is_some() {
                        return Err(invalid("more than one id".to_string()));
                    }
                    selector.id = Some(id);
                }
                '[' => {
                    let attr = parse_attribute(&mut chars).map_err(|r| invalid(r.to_string()))?;
                    selector.attributes.push(attr);
                }
                c if c.is_whitespace() || matches!(c, '>' | '+' | '~' | ',') => {
                    return Err(invalid(
                        "combinators and selector lists are not supported".to_string(),
                    ));
                }
                other => return Err(invalid(format!("unexpected character '{}'", other))),
            }
        }

        Ok(selector)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut ident = String::new();
    while let Some(&c) = chars.peek() {
        if !is_ident_char(c) {
            break;
        }
        ident.push(c);
        chars.next();
    }
    ident
}

fn skip_whitespace(chars: &mut Peekable<Chars<'_>>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

fn parse_attribute(chars: &mut Peekable<Chars<'_>>) -> Result<AttributeMatch, &'static str> {
    skip_whitespace(chars);
    let name = take_ident(chars).to_ascii_lowercase();
    if name.is_empty() {
        return Err("expected attribute name after '['");
    }
    skip_whitespace(chars);

    match chars.next() {
        Some(']') => Ok(AttributeMatch { name, value: None }),
        Some('=') => {
            skip_whitespace(chars);
            let value = match chars.peek().copied() {
                Some(quote @ ('"' | '\'')) => {
                    chars.next();
                    let mut value = String::new();
                    loop {
                        match chars.next() {
                            Some(c) if c == quote => break,
                            Some(c) => value.push(c),
                            None => return Err("unterminated attribute value"),
                        }
                    }
                    value
                }
                _ => {
                    let value = take_ident(chars);
                    if value.is_empty() {
                        return Err("expected attribute value after '='");
                    }
                    value
                }
            };
            skip_whitespace(chars);
            if chars.next() != Some(']') {
                return Err("expected ']' after attribute value");
            }
            Ok(AttributeMatch {
                name,
                value: Some(value),
            })
        }
        _ => Err("expected '=' or ']' in attribute selector"),
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_universal() {
            return f.write_str("*");
        }
        if let Some(tag) = &self.tag {
            f.write_str(tag)?;
        }
        if let Some(id) = &self.id {
            write!(f, "#{}", id)?;
        }
        for class in &self.classes {
            write!(f, ".{}", class)?;
        }
        for attr in &self.attributes {
            match &attr.value {
                Some(value) => write!(f, "[{}=\"{}\"]", attr.name, value)?,
                None => write!(f, "[{}]", attr.name)?,
            }
        }
        Ok(())
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

impl TryFrom<String> for Selector {
    type Error = SelectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Selector::parse(&value)
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        selector.to_string()
    }
}
