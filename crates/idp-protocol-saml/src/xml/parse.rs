//! XML parsing.
//!
//! A streaming reader over the few message shapes the engine consumes. Only
//! local names are matched; namespace prefixes are free. Documents carrying a
//! DOCTYPE are rejected outright, which keeps entity expansion out.

use std::collections::HashMap;

use base64::Engine;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{SamlError, SamlResult};
use crate::types::{
    AttributeSource, AuthnContextComparison, AuthnRequest, EncryptedAssertion, MatchValue,
    NameIdPolicy, RequestedAttribute, RequestedAuthnContext, SignMessage, SignMessageMimeType,
};

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attributes(e: &BytesStart<'_>) -> SamlResult<HashMap<String, String>> {
    let mut map = HashMap::new();
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

fn parse_bool(name: &str, value: &str) -> SamlResult<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(SamlError::MalformedRequest(format!(
            "{name} must be a boolean, got '{other}'"
        ))),
    }
}

fn parse_instant(value: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SamlError::MalformedRequest(format!("invalid IssueInstant '{value}': {e}")))
}

#[derive(Default)]
struct RequestParser {
    path: Vec<String>,
    text: String,
    request: Option<AuthnRequest>,
    issuer: Option<String>,
    in_extensions: bool,
    attribute: Option<RequestedAttribute>,
    match_value: Option<MatchValue>,
}

impl RequestParser {
    fn start(&mut self, e: &BytesStart<'_>) -> SamlResult<()> {
        let name = local_name(e);
        self.text.clear();

        if self.path.is_empty() {
            if self.request.is_some() {
                return Err(SamlError::MalformedRequest(
                    "content after the root element".to_string(),
                ));
            }
            if name != "AuthnRequest" {
                return Err(SamlError::MalformedRequest(format!(
                    "expected AuthnRequest, found {name}"
                )));
            }
            self.request = Some(Self::root(&attributes(e)?)?);
            return Ok(());
        }

        let Some(request) = self.request.as_mut() else {
            return Ok(());
        };
        let depth = self.path.len();
        match name.as_str() {
            "NameIDPolicy" if depth == 1 => {
                let attrs = attributes(e)?;
                request.name_id_policy = Some(NameIdPolicy {
                    format: attrs.get("Format").cloned(),
                    sp_name_qualifier: attrs.get("SPNameQualifier").cloned(),
                    allow_create: attrs
                        .get("AllowCreate")
                        .map(|v| parse_bool("AllowCreate", v))
                        .transpose()?
                        .unwrap_or(false),
                });
            }
            "RequestedAuthnContext" if depth == 1 => {
                let attrs = attributes(e)?;
                let comparison = match attrs.get("Comparison") {
                    Some(value) => AuthnContextComparison::parse(value).ok_or_else(|| {
                        SamlError::MalformedRequest(format!("invalid Comparison '{value}'"))
                    })?,
                    None => AuthnContextComparison::Exact,
                };
                request.requested_authn_context = Some(RequestedAuthnContext {
                    comparison,
                    authn_context_class_refs: Vec::new(),
                });
            }
            "Extensions" if depth == 1 => self.in_extensions = true,
            "RequestedAttribute" if self.in_extensions => {
                let attrs = attributes(e)?;
                let name = attrs.get("Name").cloned().ok_or_else(|| {
                    SamlError::MalformedRequest("RequestedAttribute without Name".to_string())
                })?;
                let required = attrs
                    .get("isRequired")
                    .map(|v| parse_bool("isRequired", v))
                    .transpose()?
                    .unwrap_or(false);
                let mut attribute = RequestedAttribute::new(name, required, AttributeSource::Request);
                attribute.friendly_name = attrs.get("FriendlyName").cloned();
                self.attribute = Some(attribute);
            }
            "MatchValue" if self.in_extensions => {
                let attrs = attributes(e)?;
                let name = attrs.get("Name").cloned().ok_or_else(|| {
                    SamlError::MalformedRequest("MatchValue without Name".to_string())
                })?;
                self.match_value = Some(MatchValue {
                    name,
                    name_format: attrs.get("NameFormat").cloned(),
                    value: String::new(),
                });
            }
            "SignMessage" if self.in_extensions => {
                if request.sign_message.is_some() {
                    return Err(SamlError::MalformedRequest("duplicate SignMessage".to_string()));
                }
                let attrs = attributes(e)?;
                let mime_type = match attrs.get("MimeType") {
                    Some(value) => SignMessageMimeType::parse(value).ok_or_else(|| {
                        SamlError::MalformedRequest(format!("invalid MimeType '{value}'"))
                    })?,
                    None => SignMessageMimeType::Text,
                };
                request.sign_message = Some(SignMessage {
                    message: None,
                    mime_type,
                    must_show: attrs
                        .get("MustShow")
                        .map(|v| parse_bool("MustShow", v))
                        .transpose()?
                        .unwrap_or(false),
                    display_entity: attrs.get("DisplayEntity").cloned(),
                });
            }
            _ => {}
        }
        Ok(())
    }

    fn end(&mut self, name: &str) -> SamlResult<()> {
        let text = std::mem::take(&mut self.text);
        let depth = self.path.len();
        let parent = if depth >= 2 {
            self.path.get(depth - 2).map(String::as_str)
        } else {
            None
        };

        match name {
            "Issuer" if depth == 2 => {
                if self.issuer.is_some() {
                    return Err(SamlError::MalformedRequest("duplicate Issuer".to_string()));
                }
                self.issuer = Some(text.trim().to_string());
            }
            "AuthnContextClassRef" if depth == 3 && parent == Some("RequestedAuthnContext") => {
                if let Some(context) = self
                    .request
                    .as_mut()
                    .and_then(|r| r.requested_authn_context.as_mut())
                {
                    context.authn_context_class_refs.push(text.trim().to_string());
                }
            }
            "AttributeValue" if parent == Some("RequestedAttribute") => {
                if let Some(attribute) = self.attribute.as_mut() {
                    attribute.values.push(text.trim().to_string());
                }
            }
            "RequestedAttribute" if self.in_extensions => {
                if let (Some(attribute), Some(request)) =
                    (self.attribute.take(), self.request.as_mut())
                {
                    request.requested_attributes.push(attribute);
                }
            }
            "MatchValue" if self.in_extensions => {
                if let (Some(mut value), Some(request)) =
                    (self.match_value.take(), self.request.as_mut())
                {
                    value.value = text.trim().to_string();
                    request.principal_selection.push(value);
                }
            }
            "Message" if self.in_extensions && parent == Some("SignMessage") => {
                if let Some(message) = self.request.as_mut().and_then(|r| r.sign_message.as_mut()) {
                    message.message = Some(text.trim().to_string());
                }
            }
            "Extensions" if depth == 2 => self.in_extensions = false,
            _ => {}
        }
        Ok(())
    }

    fn root(attrs: &HashMap<String, String>) -> SamlResult<AuthnRequest> {
        let required = |name: &str| {
            attrs
                .get(name)
                .cloned()
                .ok_or_else(|| SamlError::MalformedRequest(format!("missing {name} attribute")))
        };
        let flag = |name: &str| -> SamlResult<bool> {
            attrs
                .get(name)
                .map(|v| parse_bool(name, v))
                .transpose()
                .map(|v| v.unwrap_or(false))
        };
        let index = |name: &str| -> SamlResult<Option<u32>> {
            attrs
                .get(name)
                .map(|v| {
                    v.parse::<u32>().map_err(|_| {
                        SamlError::MalformedRequest(format!("{name} must be an unsigned integer"))
                    })
                })
                .transpose()
        };

        Ok(AuthnRequest {
            id: required("ID")?,
            version: required("Version")?,
            issue_instant: parse_instant(&required("IssueInstant")?)?,
            issuer: String::new(),
            assertion_consumer_service_url: attrs.get("AssertionConsumerServiceURL").cloned(),
            assertion_consumer_service_index: index("AssertionConsumerServiceIndex")?,
            destination: attrs.get("Destination").cloned(),
            protocol_binding: attrs.get("ProtocolBinding").cloned(),
            name_id_policy: None,
            requested_authn_context: None,
            force_authn: flag("ForceAuthn")?,
            is_passive: flag("IsPassive")?,
            provider_name: attrs.get("ProviderName").cloned(),
            requested_attributes: Vec::new(),
            principal_selection: Vec::new(),
            sign_message: None,
        })
    }
}

/// Parses an `AuthnRequest` document.
///
/// # Errors
///
/// Returns [`SamlError::MalformedRequest`] if the document is not well-formed,
/// carries a DOCTYPE, is not an `AuthnRequest` or lacks mandatory content.
pub fn parse_authn_request(xml: &str) -> SamlResult<AuthnRequest> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut parser = RequestParser::default();

    loop {
        match reader.read_event()? {
            Event::DocType(_) => {
                return Err(SamlError::MalformedRequest(
                    "DOCTYPE is not allowed".to_string(),
                ));
            }
            Event::Start(e) => {
                parser.start(&e)?;
                parser.path.push(local_name(&e));
            }
            Event::Empty(e) => {
                parser.start(&e)?;
                let name = local_name(&e);
                parser.path.push(name.clone());
                parser.end(&name)?;
                parser.path.pop();
            }
            Event::Text(t) => parser.text.push_str(&t.unescape()?),
            Event::CData(c) => parser.text.push_str(&String::from_utf8_lossy(&c)),
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                parser.end(&name)?;
                parser.path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let mut request = parser
        .request
        .ok_or_else(|| SamlError::MalformedRequest("empty document".to_string()))?;
    request.issuer = parser
        .issuer
        .ok_or_else(|| SamlError::MalformedRequest("missing Issuer".to_string()))?;
    request.validate()?;
    Ok(request)
}

fn record_method(
    e: &BytesStart<'_>,
    path: &[String],
    data_algorithm: &mut Option<String>,
    key_transport_algorithm: &mut Option<String>,
) -> SamlResult<()> {
    let algorithm = attributes(e)?.get("Algorithm").cloned();
    if path.iter().any(|p| p == "EncryptedKey") {
        *key_transport_algorithm = algorithm;
    } else if path.iter().any(|p| p == "EncryptedData") {
        *data_algorithm = algorithm;
    }
    Ok(())
}

/// Extracts the encrypted assertion of a response document, if any.
///
/// # Errors
///
/// Returns [`SamlError::MalformedRequest`] if the document is not well-formed
/// or the encrypted assertion is incomplete.
pub fn parse_encrypted_assertion(xml: &str) -> SamlResult<Option<EncryptedAssertion>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut found = false;
    let mut data_algorithm = None;
    let mut key_transport_algorithm = None;
    let mut encrypted_key = None;
    let mut cipher_value = None;

    loop {
        match reader.read_event()? {
            Event::DocType(_) => {
                return Err(SamlError::MalformedRequest(
                    "DOCTYPE is not allowed".to_string(),
                ));
            }
            Event::Start(e) => {
                let name = local_name(&e);
                match name.as_str() {
                    "EncryptedAssertion" => found = true,
                    "EncryptionMethod" => {
                        record_method(&e, &path, &mut data_algorithm, &mut key_transport_algorithm)?;
                    }
                    _ => {}
                }
                text.clear();
                path.push(name);
            }
            Event::Empty(e) => {
                if local_name(&e) == "EncryptionMethod" {
                    record_method(&e, &path, &mut data_algorithm, &mut key_transport_algorithm)?;
                }
            }
            Event::Text(t) => text.push_str(&t.unescape()?),
            Event::End(_) => {
                if let Some(name) = path.pop() {
                    if name == "CipherValue" {
                        let value = base64::engine::general_purpose::STANDARD
                            .decode(text.split_whitespace().collect::<String>())?;
                        if path.iter().any(|p| p == "EncryptedKey") {
                            encrypted_key = Some(value);
                        } else if path.iter().any(|p| p == "EncryptedData") {
                            cipher_value = Some(value);
                        }
                    }
                }
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !found {
        return Ok(None);
    }
    let incomplete = || SamlError::MalformedRequest("incomplete EncryptedAssertion".to_string());
    Ok(Some(EncryptedAssertion {
        data_algorithm: data_algorithm.ok_or_else(incomplete)?,
        key_transport_algorithm: key_transport_algorithm.ok_or_else(incomplete)?,
        encrypted_key: encrypted_key.ok_or_else(incomplete)?,
        cipher_value: cipher_value.ok_or_else(incomplete)?,
    }))
}
