//! XML serialization.
//!
//! Writers for the messages the engine emits. Output carries no XML
//! declaration so fragments can be embedded and signed as they are.

use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::escape::escape;

use crate::types::{
    Assertion, AuthnRequest, EncryptedAssertion, Response, Status, UserAttribute,
    ATTRNAME_FORMAT_URI, PRINCIPAL_SELECTION_NS, SAMLP_NS, SAML_NS, SIGN_MESSAGE_NS, XMLDSIG_NS,
    XMLENC_NS, XSI_NS, XS_NS,
};

/// Namespace of the request extension carrying requested attributes.
pub const REQUESTED_ATTRIBUTES_NS: &str = "http://eidas.europa.eu/saml-extensions";

fn instant(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape(value));
    out.push('"');
}

fn push_opt_attr(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        push_attr(out, name, value);
    }
}

fn push_text_element(out: &mut String, tag: &str, text: &str) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
    out.push_str(&escape(text));
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn push_attribute(out: &mut String, attribute: &UserAttribute) {
    out.push_str("<saml2:Attribute");
    push_attr(out, "Name", &attribute.name);
    if attribute.name.contains(':') {
        push_attr(out, "NameFormat", ATTRNAME_FORMAT_URI);
    }
    push_opt_attr(out, "FriendlyName", attribute.friendly_name.as_deref());
    out.push('>');
    for value in &attribute.values {
        out.push_str("<saml2:AttributeValue");
        push_attr(out, "xsi:type", value.xsi_type());
        out.push('>');
        out.push_str(&escape(&value.as_text()));
        out.push_str("</saml2:AttributeValue>");
    }
    out.push_str("</saml2:Attribute>");
}

/// Serializes an assertion.
#[must_use]
pub fn write_assertion(assertion: &Assertion) -> String {
    let mut out = String::with_capacity(2048);
    out.push_str("<saml2:Assertion");
    push_attr(&mut out, "xmlns:saml2", SAML_NS);
    push_attr(&mut out, "xmlns:xs", XS_NS);
    push_attr(&mut out, "xmlns:xsi", XSI_NS);
    push_attr(&mut out, "ID", &assertion.id);
    push_attr(&mut out, "IssueInstant", &instant(&assertion.issue_instant));
    push_attr(&mut out, "Version", "2.0");
    out.push('>');
    push_text_element(&mut out, "saml2:Issuer", &assertion.issuer);

    let subject = &assertion.subject;
    out.push_str("<saml2:Subject><saml2:NameID");
    push_attr(&mut out, "Format", &subject.name_id.format);
    push_opt_attr(&mut out, "NameQualifier", subject.name_id.name_qualifier.as_deref());
    push_opt_attr(&mut out, "SPNameQualifier", subject.name_id.sp_name_qualifier.as_deref());
    out.push('>');
    out.push_str(&escape(&subject.name_id.value));
    out.push_str("</saml2:NameID>");

    let confirmation = &subject.confirmation;
    out.push_str("<saml2:SubjectConfirmation");
    push_attr(&mut out, "Method", &confirmation.method);
    out.push_str("><saml2:SubjectConfirmationData");
    push_opt_attr(&mut out, "Address", confirmation.address.as_deref());
    push_attr(&mut out, "InResponseTo", &confirmation.in_response_to);
    push_attr(&mut out, "NotOnOrAfter", &instant(&confirmation.not_on_or_after));
    push_attr(&mut out, "Recipient", &confirmation.recipient);
    out.push_str("/></saml2:SubjectConfirmation></saml2:Subject>");

    let conditions = &assertion.conditions;
    out.push_str("<saml2:Conditions");
    push_attr(&mut out, "NotBefore", &instant(&conditions.not_before));
    push_attr(&mut out, "NotOnOrAfter", &instant(&conditions.not_on_or_after));
    out.push_str("><saml2:AudienceRestriction>");
    for audience in &conditions.audiences {
        push_text_element(&mut out, "saml2:Audience", audience);
    }
    out.push_str("</saml2:AudienceRestriction></saml2:Conditions>");

    let statement = &assertion.authn_statement;
    out.push_str("<saml2:AuthnStatement");
    push_attr(&mut out, "AuthnInstant", &instant(&statement.authn_instant));
    push_attr(&mut out, "SessionIndex", &statement.session_index);
    out.push('>');
    if let Some(address) = statement.subject_locality.as_deref() {
        out.push_str("<saml2:SubjectLocality");
        push_attr(&mut out, "Address", address);
        out.push_str("/>");
    }
    out.push_str("<saml2:AuthnContext>");
    push_text_element(
        &mut out,
        "saml2:AuthnContextClassRef",
        &statement.authn_context_class_ref,
    );
    if let Some(authority) = statement.authenticating_authority.as_deref() {
        push_text_element(&mut out, "saml2:AuthenticatingAuthority", authority);
    }
    out.push_str("</saml2:AuthnContext></saml2:AuthnStatement>");

    if !assertion.attributes.is_empty() {
        out.push_str("<saml2:AttributeStatement>");
        for attribute in &assertion.attributes {
            push_attribute(&mut out, attribute);
        }
        out.push_str("</saml2:AttributeStatement>");
    }

    out.push_str("</saml2:Assertion>");
    out
}

/// Serializes an encrypted assertion.
#[must_use]
pub fn write_encrypted_assertion(encrypted: &EncryptedAssertion) -> String {
    let b64 = base64::engine::general_purpose::STANDARD;
    let mut out = String::with_capacity(1024);
    out.push_str("<saml2:EncryptedAssertion");
    push_attr(&mut out, "xmlns:saml2", SAML_NS);
    out.push_str("><xenc:EncryptedData");
    push_attr(&mut out, "xmlns:xenc", XMLENC_NS);
    push_attr(&mut out, "Type", "http://www.w3.org/2001/04/xmlenc#Element");
    out.push_str("><xenc:EncryptionMethod");
    push_attr(&mut out, "Algorithm", &encrypted.data_algorithm);
    out.push_str("/><ds:KeyInfo");
    push_attr(&mut out, "xmlns:ds", XMLDSIG_NS);
    out.push_str("><xenc:EncryptedKey><xenc:EncryptionMethod");
    push_attr(&mut out, "Algorithm", &encrypted.key_transport_algorithm);
    out.push_str("/><xenc:CipherData>");
    push_text_element(&mut out, "xenc:CipherValue", &b64.encode(&encrypted.encrypted_key));
    out.push_str("</xenc:CipherData></xenc:EncryptedKey></ds:KeyInfo><xenc:CipherData>");
    push_text_element(&mut out, "xenc:CipherValue", &b64.encode(&encrypted.cipher_value));
    out.push_str("</xenc:CipherData></xenc:EncryptedData></saml2:EncryptedAssertion>");
    out
}

fn push_status(out: &mut String, status: &Status) {
    out.push_str("<saml2p:Status><saml2p:StatusCode");
    push_attr(out, "Value", &status.code);
    match status.sub_code.as_deref() {
        Some(sub_code) => {
            out.push_str("><saml2p:StatusCode");
            push_attr(out, "Value", sub_code);
            out.push_str("/></saml2p:StatusCode>");
        }
        None => out.push_str("/>"),
    }
    if let Some(message) = status.message.as_deref() {
        push_text_element(out, "saml2p:StatusMessage", message);
    }
    out.push_str("</saml2p:Status>");
}

/// Serializes a response around an already serialized (signed or encrypted)
/// assertion fragment.
#[must_use]
pub fn write_response(response: &Response, assertion_fragment: Option<&str>) -> String {
    let mut out = String::with_capacity(1024 + assertion_fragment.map_or(0, str::len));
    out.push_str("<saml2p:Response");
    push_attr(&mut out, "xmlns:saml2p", SAMLP_NS);
    push_attr(&mut out, "xmlns:saml2", SAML_NS);
    push_attr(&mut out, "Destination", &response.destination);
    push_attr(&mut out, "ID", &response.id);
    push_attr(&mut out, "InResponseTo", &response.in_response_to);
    push_attr(&mut out, "IssueInstant", &instant(&response.issue_instant));
    push_attr(&mut out, "Version", "2.0");
    out.push('>');
    push_text_element(&mut out, "saml2:Issuer", &response.issuer);
    push_status(&mut out, &response.status);
    if let Some(fragment) = assertion_fragment {
        out.push_str(fragment);
    }
    out.push_str("</saml2p:Response>");
    out
}

/// Serializes an authentication request.
///
/// This is the SP side of the exchange; the IdP uses it to produce test
/// fixtures and for diagnostics.
#[must_use]
pub fn write_authn_request(request: &AuthnRequest) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str("<saml2p:AuthnRequest");
    push_attr(&mut out, "xmlns:saml2p", SAMLP_NS);
    push_attr(&mut out, "xmlns:saml2", SAML_NS);
    push_opt_attr(
        &mut out,
        "AssertionConsumerServiceURL",
        request.assertion_consumer_service_url.as_deref(),
    );
    if let Some(index) = request.assertion_consumer_service_index {
        push_attr(&mut out, "AssertionConsumerServiceIndex", &index.to_string());
    }
    push_opt_attr(&mut out, "Destination", request.destination.as_deref());
    if request.force_authn {
        push_attr(&mut out, "ForceAuthn", "true");
    }
    push_attr(&mut out, "ID", &request.id);
    if request.is_passive {
        push_attr(&mut out, "IsPassive", "true");
    }
    push_attr(&mut out, "IssueInstant", &instant(&request.issue_instant));
    push_opt_attr(&mut out, "ProtocolBinding", request.protocol_binding.as_deref());
    push_opt_attr(&mut out, "ProviderName", request.provider_name.as_deref());
    push_attr(&mut out, "Version", &request.version);
    out.push('>');
    push_text_element(&mut out, "saml2:Issuer", &request.issuer);

    let has_extensions = !request.requested_attributes.is_empty()
        || !request.principal_selection.is_empty()
        || request.sign_message.is_some();
    if has_extensions {
        out.push_str("<saml2p:Extensions>");
    }
    if !request.requested_attributes.is_empty() {
        out.push_str("<req:RequestedAttributes");
        push_attr(&mut out, "xmlns:req", REQUESTED_ATTRIBUTES_NS);
        out.push('>');
        for attribute in &request.requested_attributes {
            out.push_str("<req:RequestedAttribute");
            push_attr(&mut out, "Name", &attribute.name);
            push_opt_attr(&mut out, "FriendlyName", attribute.friendly_name.as_deref());
            push_attr(&mut out, "isRequired", if attribute.required { "true" } else { "false" });
            if attribute.values.is_empty() {
                out.push_str("/>");
            } else {
                out.push('>');
                for value in &attribute.values {
                    push_text_element(&mut out, "req:AttributeValue", value);
                }
                out.push_str("</req:RequestedAttribute>");
            }
        }
        out.push_str("</req:RequestedAttributes>");
    }
    if !request.principal_selection.is_empty() {
        out.push_str("<psc:PrincipalSelection");
        push_attr(&mut out, "xmlns:psc", PRINCIPAL_SELECTION_NS);
        out.push('>');
        for value in &request.principal_selection {
            out.push_str("<psc:MatchValue");
            push_attr(&mut out, "Name", &value.name);
            push_opt_attr(&mut out, "NameFormat", value.name_format.as_deref());
            out.push('>');
            out.push_str(&escape(&value.value));
            out.push_str("</psc:MatchValue>");
        }
        out.push_str("</psc:PrincipalSelection>");
    }
    if let Some(message) = &request.sign_message {
        out.push_str("<csig:SignMessage");
        push_attr(&mut out, "xmlns:csig", SIGN_MESSAGE_NS);
        push_opt_attr(&mut out, "DisplayEntity", message.display_entity.as_deref());
        push_attr(&mut out, "MimeType", message.mime_type.as_str());
        push_attr(&mut out, "MustShow", if message.must_show { "true" } else { "false" });
        out.push('>');
        if let Some(text) = &message.message {
            push_text_element(&mut out, "csig:Message", text);
        }
        out.push_str("</csig:SignMessage>");
    }
    if has_extensions {
        out.push_str("</saml2p:Extensions>");
    }

    if let Some(policy) = &request.name_id_policy {
        out.push_str("<saml2p:NameIDPolicy");
        push_attr(&mut out, "AllowCreate", if policy.allow_create { "true" } else { "false" });
        push_opt_attr(&mut out, "Format", policy.format.as_deref());
        push_opt_attr(&mut out, "SPNameQualifier", policy.sp_name_qualifier.as_deref());
        out.push_str("/>");
    }

    if let Some(context) = &request.requested_authn_context {
        out.push_str("<saml2p:RequestedAuthnContext");
        push_attr(&mut out, "Comparison", context.comparison.as_str());
        out.push('>');
        for class_ref in &context.authn_context_class_refs {
            push_text_element(&mut out, "saml2:AuthnContextClassRef", class_ref);
        }
        out.push_str("</saml2p:RequestedAuthnContext>");
    }

    out.push_str("</saml2p:AuthnRequest>");
    out
}
