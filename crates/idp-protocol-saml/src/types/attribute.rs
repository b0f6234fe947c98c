//! Attribute types.
//!
//! [`UserAttribute`] is what the IdP knows or derives about a subject;
//! [`RequestedAttribute`] is what an SP asked for, and where it asked.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// `xs:string`.
    String(String),
    /// `xs:boolean`.
    Boolean(bool),
    /// `xs:integer`.
    Integer(i64),
    /// `xs:dateTime`.
    DateTime(DateTime<Utc>),
}

impl AttributeValue {
    /// Returns the lexical form of the value.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Boolean(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Returns the `xsi:type` of the value.
    #[must_use]
    pub const fn xsi_type(&self) -> &'static str {
        match self {
            Self::String(_) => "xs:string",
            Self::Boolean(_) => "xs:boolean",
            Self::Integer(_) => "xs:integer",
            Self::DateTime(_) => "xs:dateTime",
        }
    }

    /// Returns the string content of a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// A subject attribute with its ordered values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttribute {
    /// Attribute name, usually a URI.
    pub name: String,

    /// Human readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    /// Attribute values in release order.
    pub values: Vec<AttributeValue>,
}

impl UserAttribute {
    /// Creates an attribute with a single string value.
    #[must_use]
    pub fn single(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            name: name.into(),
            friendly_name: None,
            values: vec![value.into()],
        }
    }

    /// Creates an attribute with the given values.
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        Self {
            name: name.into(),
            friendly_name: None,
            values,
        }
    }

    /// Sets the friendly name.
    #[must_use]
    pub fn with_friendly_name(mut self, friendly_name: impl Into<String>) -> Self {
        self.friendly_name = Some(friendly_name.into());
        self
    }

    /// Returns the first string value.
    #[must_use]
    pub fn first_str(&self) -> Option<&str> {
        self.values.iter().find_map(AttributeValue::as_str)
    }
}

/// Where an attribute request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeSource {
    /// Listed in the request extensions.
    Request,
    /// Declared in the SP metadata.
    Metadata,
    /// Implied by an entity category of the SP.
    EntityCategory,
}

/// An attribute an SP wants released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedAttribute {
    /// Attribute name.
    pub name: String,

    /// Human readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    /// Whether the response must fail if the attribute cannot be released.
    pub required: bool,

    /// Values the SP expects, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,

    /// Origin of the request.
    pub source: AttributeSource,
}

impl RequestedAttribute {
    /// Creates a requested attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, required: bool, source: AttributeSource) -> Self {
        Self {
            name: name.into(),
            friendly_name: None,
            required,
            values: Vec::new(),
            source,
        }
    }

    /// Sets the friendly name.
    #[must_use]
    pub fn with_friendly_name(mut self, friendly_name: impl Into<String>) -> Self {
        self.friendly_name = Some(friendly_name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn value_lexical_forms() {
        assert_eq!(AttributeValue::Boolean(true).as_text(), "true");
        assert_eq!(AttributeValue::Integer(-4).as_text(), "-4");
        let dt = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(AttributeValue::DateTime(dt).as_text(), "2024-05-01T12:00:00Z");
        assert_eq!(AttributeValue::from("x").xsi_type(), "xs:string");
    }

    #[test]
    fn first_str_skips_non_strings() {
        let attr = UserAttribute::new(
            "mixed",
            vec![AttributeValue::Integer(1), AttributeValue::from("second")],
        );
        assert_eq!(attr.first_str(), Some("second"));
    }
}
