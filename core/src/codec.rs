//! XML envelopes: decoding on the client, encoding on the fake server.
//!
//! # Design
//! Documents are read into a small element tree with `quick_xml::Reader`,
//! then each result shape has its own decode function that walks the exact
//! element path it expects (`<XResponse>/<XResult>/...`). A renamed or moved
//! element is a `DecodeError`, never a silently empty field.
//!
//! Encoding writes the same shapes with `quick_xml::Writer`, so whatever the
//! fake server emits decodes with the functions below.

use std::io::Cursor;
use std::str;

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::action::Action;
use crate::error::{DecodeError, ServiceError};
use crate::http::HttpResponse;
use crate::types::{
    CreateLoadBalancerResp, DeregisterInstancesResp, DescribeInstanceHealthResp,
    DescribeLoadBalancersResp, HealthCheck, Instance, InstanceState, Listener,
    ListenerDescription, LoadBalancerDescription, RegisterInstancesResp, SimpleResp,
    SourceSecurityGroup,
};

/// Namespace declared on every document the fake server writes.
pub const XML_NAMESPACE: &str = "http://elasticloadbalancing.amazonaws.com/doc/2012-06-01/";

// ---------------------------------------------------------------------------
// Element tree
// ---------------------------------------------------------------------------

/// One XML element: local name, trimmed text, child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn expect_child(&self, name: &str) -> Result<&Element, DecodeError> {
        self.child(name)
            .ok_or_else(|| DecodeError::missing(&self.name, name))
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Text of `name`, which must be present (it may be empty).
    pub fn required_text(&self, name: &str) -> Result<String, DecodeError> {
        self.expect_child(name).map(|c| c.text.clone())
    }

    /// Text of `name`, or an empty string if the element is absent.
    pub fn text_or_empty(&self, name: &str) -> String {
        self.child_text(name).unwrap_or_default().to_string()
    }

    /// The `<member>` children of this element.
    pub fn members(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter(|c| c.name == "member")
    }

    /// First element named `name`, depth-first, starting with `self`.
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    fn expect_name(&self, name: &str) -> Result<(), DecodeError> {
        if self.name == name {
            Ok(())
        } else {
            Err(DecodeError::unexpected(name, &self.name))
        }
    }
}

/// Parse a whole document into its root element.
pub fn parse_document(xml: &str) -> Result<Element, DecodeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if root.is_some() {
                    return Err(DecodeError("content after the root element".to_string()));
                }
                stack.push(Element::new(local_name(e.local_name().as_ref())?));
            }
            Ok(Event::Empty(ref e)) => {
                let element = Element::new(local_name(e.local_name().as_ref())?);
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| DecodeError("unbalanced closing tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| DecodeError(format!("invalid text: {err}")))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(DecodeError(format!(
                    "XML error at position {}: {err}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(DecodeError("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| DecodeError("document has no root element".to_string()))
}

fn local_name(bytes: &[u8]) -> Result<String, DecodeError> {
    str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| DecodeError("invalid UTF-8 in tag name".to_string()))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), DecodeError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(DecodeError("content after the root element".to_string())),
    }
    Ok(())
}

fn parse_number<T: str::FromStr>(parent: &Element, name: &str) -> Result<T, DecodeError> {
    let text = parent.required_text(name)?;
    text.parse()
        .map_err(|_| DecodeError(format!("<{name}> is not a number: {text:?}")))
}

fn member_texts(parent: &Element, list: &str) -> Vec<String> {
    parent
        .child(list)
        .map(|l| l.members().map(|m| m.text.clone()).collect())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// The document could not be written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("encode failed: {0}")]
pub struct EncodeError(pub String);

/// Thin element-oriented wrapper over `quick_xml::Writer`.
pub struct XmlWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl XmlWriter {
    fn new() -> Result<Self, EncodeError> {
        let mut writer = Self {
            writer: Writer::new(Cursor::new(Vec::new())),
        };
        writer.emit(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(writer)
    }

    fn emit(&mut self, event: Event<'_>) -> Result<(), EncodeError> {
        self.writer
            .write_event(event)
            .map_err(|e| EncodeError(e.to_string()))
    }

    fn root(
        &mut self,
        name: &str,
        body: impl FnOnce(&mut Self) -> Result<(), EncodeError>,
    ) -> Result<(), EncodeError> {
        let mut start = BytesStart::new(name);
        start.push_attribute(("xmlns", XML_NAMESPACE));
        self.emit(Event::Start(start))?;
        body(self)?;
        self.emit(Event::End(BytesEnd::new(name)))
    }

    /// `<name>...</name>`
    pub fn element(
        &mut self,
        name: &str,
        body: impl FnOnce(&mut Self) -> Result<(), EncodeError>,
    ) -> Result<(), EncodeError> {
        self.emit(Event::Start(BytesStart::new(name)))?;
        body(self)?;
        self.emit(Event::End(BytesEnd::new(name)))
    }

    /// `<name>text</name>`, escaped.
    pub fn text_element(&mut self, name: &str, text: &str) -> Result<(), EncodeError> {
        self.element(name, |w| {
            if text.is_empty() {
                Ok(())
            } else {
                w.emit(Event::Text(BytesText::new(text)))
            }
        })
    }

    /// `<list><member>...</member>...</list>`
    pub fn members<T>(
        &mut self,
        list: &str,
        items: &[T],
        mut body: impl FnMut(&mut Self, &T) -> Result<(), EncodeError>,
    ) -> Result<(), EncodeError> {
        self.element(list, |w| {
            for item in items {
                w.element("member", |w| body(w, item))?;
            }
            Ok(())
        })
    }

    /// `<list><member>text</member>...</list>`
    pub fn text_members<S: AsRef<str>>(&mut self, list: &str, items: &[S]) -> Result<(), EncodeError> {
        self.element(list, |w| {
            for item in items {
                w.text_element("member", item.as_ref())?;
            }
            Ok(())
        })
    }

    fn finish(self) -> Result<String, EncodeError> {
        String::from_utf8(self.writer.into_inner().into_inner())
            .map_err(|e| EncodeError(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Success envelopes
// ---------------------------------------------------------------------------

/// A result type with a `<{Action}Response>` envelope.
pub trait XmlResponse: Sized {
    const ACTION: Action;

    fn request_id(&self) -> &str;

    /// Decode from the `<{Action}Result>` element.
    fn decode_result(result: &Element, request_id: String) -> Result<Self, DecodeError>;

    /// Write the children of `<{Action}Result>`.
    fn encode_result(&self, w: &mut XmlWriter) -> Result<(), EncodeError>;
}

/// Decode a 200 response body into `R`.
pub fn decode<R: XmlResponse>(body: &str) -> Result<R, DecodeError> {
    let root = parse_document(body)?;
    let action = R::ACTION;
    root.expect_name(&format!("{action}Response"))?;
    let result = root.expect_child(&format!("{action}Result"))?;
    let request_id = root
        .expect_child("ResponseMetadata")?
        .required_text("RequestId")?;
    R::decode_result(result, request_id)
}

/// Encode `response` as a full `<{Action}Response>` document.
pub fn encode<R: XmlResponse>(response: &R) -> Result<String, EncodeError> {
    let action = R::ACTION;
    let mut w = XmlWriter::new()?;
    w.root(&format!("{action}Response"), |w| {
        w.element(&format!("{action}Result"), |w| response.encode_result(w))?;
        w.element("ResponseMetadata", |w| {
            w.text_element("RequestId", response.request_id())
        })
    })?;
    w.finish()
}

impl XmlResponse for CreateLoadBalancerResp {
    const ACTION: Action = Action::CreateLoadBalancer;

    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn decode_result(result: &Element, request_id: String) -> Result<Self, DecodeError> {
        Ok(Self {
            dns_name: result.required_text("DNSName")?,
            request_id,
        })
    }

    fn encode_result(&self, w: &mut XmlWriter) -> Result<(), EncodeError> {
        w.text_element("DNSName", &self.dns_name)
    }
}

impl XmlResponse for SimpleResp {
    const ACTION: Action = Action::DeleteLoadBalancer;

    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn decode_result(_result: &Element, request_id: String) -> Result<Self, DecodeError> {
        Ok(Self { request_id })
    }

    fn encode_result(&self, _w: &mut XmlWriter) -> Result<(), EncodeError> {
        Ok(())
    }
}

fn decode_instance_ids(result: &Element) -> Result<Vec<String>, DecodeError> {
    result
        .expect_child("Instances")?
        .members()
        .map(|m| m.required_text("InstanceId"))
        .collect()
}

fn encode_instance_ids(w: &mut XmlWriter, ids: &[String]) -> Result<(), EncodeError> {
    w.members("Instances", ids, |w, id| w.text_element("InstanceId", id))
}

impl XmlResponse for RegisterInstancesResp {
    const ACTION: Action = Action::RegisterInstancesWithLoadBalancer;

    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn decode_result(result: &Element, request_id: String) -> Result<Self, DecodeError> {
        Ok(Self {
            instance_ids: decode_instance_ids(result)?,
            request_id,
        })
    }

    fn encode_result(&self, w: &mut XmlWriter) -> Result<(), EncodeError> {
        encode_instance_ids(w, &self.instance_ids)
    }
}

impl XmlResponse for DeregisterInstancesResp {
    const ACTION: Action = Action::DeregisterInstancesFromLoadBalancer;

    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn decode_result(result: &Element, request_id: String) -> Result<Self, DecodeError> {
        Ok(Self {
            instance_ids: decode_instance_ids(result)?,
            request_id,
        })
    }

    fn encode_result(&self, w: &mut XmlWriter) -> Result<(), EncodeError> {
        encode_instance_ids(w, &self.instance_ids)
    }
}

impl XmlResponse for DescribeLoadBalancersResp {
    const ACTION: Action = Action::DescribeLoadBalancers;

    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn decode_result(result: &Element, request_id: String) -> Result<Self, DecodeError> {
        let load_balancer_descriptions = result
            .expect_child("LoadBalancerDescriptions")?
            .members()
            .map(decode_description)
            .collect::<Result<_, _>>()?;
        Ok(Self {
            load_balancer_descriptions,
            request_id,
        })
    }

    fn encode_result(&self, w: &mut XmlWriter) -> Result<(), EncodeError> {
        w.members(
            "LoadBalancerDescriptions",
            &self.load_balancer_descriptions,
            encode_description,
        )
    }
}

fn decode_description(m: &Element) -> Result<LoadBalancerDescription, DecodeError> {
    let created_time = match m.child_text("CreatedTime") {
        Some(t) if !t.is_empty() => Some(
            DateTime::parse_from_rfc3339(t)
                .map_err(|e| DecodeError(format!("<CreatedTime> {t:?}: {e}")))?
                .with_timezone(&Utc),
        ),
        _ => None,
    };
    let listener_descriptions = match m.child("ListenerDescriptions") {
        Some(list) => list
            .members()
            .map(decode_listener_description)
            .collect::<Result<_, _>>()?,
        None => Vec::new(),
    };
    let instances = match m.child("Instances") {
        Some(list) => list
            .members()
            .map(|i| {
                Ok(Instance {
                    instance_id: i.required_text("InstanceId")?,
                })
            })
            .collect::<Result<_, DecodeError>>()?,
        None => Vec::new(),
    };
    let source_security_group = match m.child("SourceSecurityGroup") {
        Some(g) => SourceSecurityGroup {
            group_name: g.text_or_empty("GroupName"),
            owner_alias: g.text_or_empty("OwnerAlias"),
        },
        None => SourceSecurityGroup {
            group_name: String::new(),
            owner_alias: String::new(),
        },
    };

    Ok(LoadBalancerDescription {
        load_balancer_name: m.required_text("LoadBalancerName")?,
        dns_name: m.text_or_empty("DNSName"),
        canonical_hosted_zone_name: m.text_or_empty("CanonicalHostedZoneName"),
        canonical_hosted_zone_name_id: m.text_or_empty("CanonicalHostedZoneNameID"),
        created_time,
        scheme: m.text_or_empty("Scheme"),
        health_check: decode_health_check(m.expect_child("HealthCheck")?)?,
        listener_descriptions,
        instances,
        availability_zones: member_texts(m, "AvailabilityZones"),
        subnets: member_texts(m, "Subnets"),
        security_groups: member_texts(m, "SecurityGroups"),
        source_security_group,
    })
}

fn decode_health_check(hc: &Element) -> Result<HealthCheck, DecodeError> {
    Ok(HealthCheck {
        healthy_threshold: parse_number(hc, "HealthyThreshold")?,
        interval: parse_number(hc, "Interval")?,
        target: hc.required_text("Target")?,
        timeout: parse_number(hc, "Timeout")?,
        unhealthy_threshold: parse_number(hc, "UnhealthyThreshold")?,
    })
}

fn decode_listener_description(m: &Element) -> Result<ListenerDescription, DecodeError> {
    let l = m.expect_child("Listener")?;
    Ok(ListenerDescription {
        listener: Listener {
            instance_port: parse_number(l, "InstancePort")?,
            instance_protocol: l.text_or_empty("InstanceProtocol"),
            load_balancer_port: parse_number(l, "LoadBalancerPort")?,
            protocol: l.required_text("Protocol")?,
            ssl_certificate_id: l
                .child_text("SSLCertificateId")
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        },
        policy_names: member_texts(m, "PolicyNames"),
    })
}

fn encode_description(w: &mut XmlWriter, d: &LoadBalancerDescription) -> Result<(), EncodeError> {
    w.text_members("SecurityGroups", &d.security_groups)?;
    w.text_element("LoadBalancerName", &d.load_balancer_name)?;
    if let Some(created) = d.created_time {
        w.text_element(
            "CreatedTime",
            &created.to_rfc3339_opts(SecondsFormat::Millis, true),
        )?;
    }
    w.element("HealthCheck", |w| {
        let hc = &d.health_check;
        w.text_element("Interval", &hc.interval.to_string())?;
        w.text_element("Target", &hc.target)?;
        w.text_element("HealthyThreshold", &hc.healthy_threshold.to_string())?;
        w.text_element("Timeout", &hc.timeout.to_string())?;
        w.text_element("UnhealthyThreshold", &hc.unhealthy_threshold.to_string())
    })?;
    w.members("ListenerDescriptions", &d.listener_descriptions, |w, ld| {
        w.text_members("PolicyNames", &ld.policy_names)?;
        w.element("Listener", |w| {
            let l = &ld.listener;
            w.text_element("Protocol", &l.protocol)?;
            w.text_element("LoadBalancerPort", &l.load_balancer_port.to_string())?;
            w.text_element("InstanceProtocol", &l.instance_protocol)?;
            if let Some(cert) = &l.ssl_certificate_id {
                w.text_element("SSLCertificateId", cert)?;
            }
            w.text_element("InstancePort", &l.instance_port.to_string())
        })
    })?;
    w.members("Instances", &d.instances, |w, i| {
        w.text_element("InstanceId", &i.instance_id)
    })?;
    w.text_members("AvailabilityZones", &d.availability_zones)?;
    w.text_element("CanonicalHostedZoneName", &d.canonical_hosted_zone_name)?;
    w.text_element("CanonicalHostedZoneNameID", &d.canonical_hosted_zone_name_id)?;
    w.text_element("Scheme", &d.scheme)?;
    w.element("SourceSecurityGroup", |w| {
        w.text_element("OwnerAlias", &d.source_security_group.owner_alias)?;
        w.text_element("GroupName", &d.source_security_group.group_name)
    })?;
    w.text_element("DNSName", &d.dns_name)?;
    w.text_members("Subnets", &d.subnets)
}

impl XmlResponse for DescribeInstanceHealthResp {
    const ACTION: Action = Action::DescribeInstanceHealth;

    fn request_id(&self) -> &str {
        &self.request_id
    }

    fn decode_result(result: &Element, request_id: String) -> Result<Self, DecodeError> {
        let instance_states = result
            .expect_child("InstanceStates")?
            .members()
            .map(|m| {
                Ok(InstanceState {
                    description: m.text_or_empty("Description"),
                    instance_id: m.required_text("InstanceId")?,
                    reason_code: m.text_or_empty("ReasonCode"),
                    state: m.required_text("State")?,
                })
            })
            .collect::<Result<_, DecodeError>>()?;
        Ok(Self {
            instance_states,
            request_id,
        })
    }

    fn encode_result(&self, w: &mut XmlWriter) -> Result<(), EncodeError> {
        w.members("InstanceStates", &self.instance_states, |w, s| {
            w.text_element("Description", &s.description)?;
            w.text_element("InstanceId", &s.instance_id)?;
            w.text_element("State", &s.state)?;
            w.text_element("ReasonCode", &s.reason_code)
        })
    }
}

// ---------------------------------------------------------------------------
// Error envelope
// ---------------------------------------------------------------------------

/// Build a `ServiceError` from a non-200 response.
///
/// The first `<Error>` entry wins. A body without one (or without a message)
/// falls back to the HTTP status line, with an empty code.
pub fn decode_error(response: &HttpResponse) -> ServiceError {
    let entry = parse_document(&response.body)
        .ok()
        .and_then(|root| root.find("Error").cloned());

    let (code, message) = match entry {
        Some(e) => (e.text_or_empty("Code"), e.text_or_empty("Message")),
        None => (String::new(), String::new()),
    };
    let message = if message.is_empty() {
        response.status_line()
    } else {
        message
    };
    ServiceError {
        status_code: response.status,
        code,
        message,
    }
}

/// Encode `err` as an `<ErrorResponse>` document.
pub fn encode_error(err: &ServiceError, request_id: &str) -> Result<String, EncodeError> {
    let error_type = if err.status_code >= 500 { "Receiver" } else { "Sender" };
    let mut w = XmlWriter::new()?;
    w.root("ErrorResponse", |w| {
        w.element("Error", |w| {
            w.text_element("Type", error_type)?;
            w.text_element("Code", &err.code)?;
            w.text_element("Message", &err.message)
        })?;
        w.text_element("RequestId", request_id)
    })?;
    w.finish()
}
