//! ONVIF pull-point event subscription messages
//!
//! Builds the SOAP bodies for `CreatePullPointSubscription`, `PullMessages`,
//! `Renew` and `Unsubscribe`, and decodes `PullMessages` notifications into
//! [`EventReport`]s.

use std::time::Duration;
use xmltree::Element;

use crate::error::{ApiError, Result};
use crate::event::{CameraEvent, EventReport, EventState};
use crate::xml::{self, escape};

const EVENTS_WSDL: &str = "http://www.onvif.org/ver10/events/wsdl";
const NOTIFICATION_NS: &str = "http://docs.oasis-open.org/wsn/b-2";

/// Topic (without namespace prefixes) → event
const TOPICS: &[(&str, CameraEvent)] = &[
    ("VideoSource/MotionAlarm", CameraEvent::MotionDetect),
    ("RuleEngine/CellMotionDetector/Motion", CameraEvent::MotionDetect),
    ("VideoSource/GlobalSceneChange/ImagingService", CameraEvent::ViewTamper),
    ("RuleEngine/TamperDetector/Tamper", CameraEvent::ViewTamper),
    ("RuleEngine/LineDetector/Crossed", CameraEvent::LineCross),
    ("RuleEngine/FieldDetector/ObjectsInside", CameraEvent::Intrusion),
    ("AudioAnalytics/Audio/DetectedSound", CameraEvent::AudioException),
    ("RuleEngine/CountAggregation/Counter", CameraEvent::ObjectCounting),
];

const DIGITAL_INPUT: &str = "Device/Trigger/DigitalInput";

/// SOAP operations of the pull-point protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OnvifAction {
    CreatePullPointSubscription,
    PullMessages,
    Renew,
    Unsubscribe,
}

impl OnvifAction {
    pub fn soap_action(self) -> &'static str {
        match self {
            OnvifAction::CreatePullPointSubscription => {
                "http://www.onvif.org/ver10/events/wsdl/EventPortType/CreatePullPointSubscriptionRequest"
            }
            OnvifAction::PullMessages => {
                "http://www.onvif.org/ver10/events/wsdl/PullPointSubscription/PullMessagesRequest"
            }
            OnvifAction::Renew => "http://docs.oasis-open.org/wsn/bw-2/SubscriptionManager/RenewRequest",
            OnvifAction::Unsubscribe => {
                "http://docs.oasis-open.org/wsn/bw-2/SubscriptionManager/UnsubscribeRequest"
            }
        }
    }
}

/// A SOAP request ready for the ONVIF client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnvifRequest {
    pub action: OnvifAction,
    /// Subscription manager address; `None` targets the device event service
    pub address: Option<String>,
    pub envelope: String,
}

fn envelope(to: Option<&str>, body: &str) -> String {
    let header = match to {
        Some(address) => format!(
            r#"<s:Header><wsa:To xmlns:wsa="http://www.w3.org/2005/08/addressing">{}</wsa:To></s:Header>"#,
            escape(address)
        ),
        None => String::new(),
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">{header}<s:Body>{body}</s:Body></s:Envelope>"#
    )
}

/// `PT<n>S` duration as used by WS-BaseNotification
fn xs_duration(duration: Duration) -> String {
    format!("PT{}S", duration.as_secs().max(1))
}

pub fn create_pull_point_subscription(termination: Duration) -> OnvifRequest {
    let body = format!(
        r#"<CreatePullPointSubscription xmlns="{EVENTS_WSDL}"><InitialTerminationTime>{}</InitialTerminationTime></CreatePullPointSubscription>"#,
        xs_duration(termination)
    );
    OnvifRequest {
        action: OnvifAction::CreatePullPointSubscription,
        address: None,
        envelope: envelope(None, &body),
    }
}

pub fn pull_messages(address: &str, timeout: Duration, limit: u32) -> OnvifRequest {
    let body = format!(
        r#"<PullMessages xmlns="{EVENTS_WSDL}"><Timeout>{}</Timeout><MessageLimit>{limit}</MessageLimit></PullMessages>"#,
        xs_duration(timeout)
    );
    OnvifRequest {
        action: OnvifAction::PullMessages,
        address: Some(address.to_string()),
        envelope: envelope(Some(address), &body),
    }
}

pub fn renew(address: &str, termination: Duration) -> OnvifRequest {
    let body = format!(
        r#"<Renew xmlns="{NOTIFICATION_NS}"><TerminationTime>{}</TerminationTime></Renew>"#,
        xs_duration(termination)
    );
    OnvifRequest {
        action: OnvifAction::Renew,
        address: Some(address.to_string()),
        envelope: envelope(Some(address), &body),
    }
}

pub fn unsubscribe(address: &str) -> OnvifRequest {
    let body = format!(r#"<Unsubscribe xmlns="{NOTIFICATION_NS}"/>"#);
    OnvifRequest {
        action: OnvifAction::Unsubscribe,
        address: Some(address.to_string()),
        envelope: envelope(Some(address), &body),
    }
}

/// Parse a SOAP response, turning a `Fault` body into an error
pub fn parse_envelope(body: &str) -> Result<Element> {
    let root = xml::parse_root(body)?;
    if let Some(fault) = xml::find(&root, "Fault") {
        let reason = xml::text(fault, "Text")
            .or_else(|| xml::text(fault, "faultstring"))
            .unwrap_or_else(|| "unknown".to_string());
        return Err(ApiError::Fault(reason));
    }
    Ok(root)
}

/// Address of the subscription manager from a `CreatePullPointSubscriptionResponse`
pub fn parse_subscription(body: &str) -> Result<String> {
    let root = parse_envelope(body)?;
    xml::find(&root, "SubscriptionReference")
        .and_then(|reference| xml::text(reference, "Address"))
        .filter(|address| !address.is_empty())
        .ok_or_else(|| ApiError::ParseError("subscription response without address".to_string()))
}

fn strip_prefixes(topic: &str) -> String {
    topic
        .trim()
        .split('/')
        .map(|segment| segment.rsplit(':').next().unwrap_or(segment))
        .collect::<Vec<_>>()
        .join("/")
}

/// Event a topic maps onto, if the NVR tracks it
pub fn event_for_topic(topic: &str) -> Option<CameraEvent> {
    let topic = strip_prefixes(topic);
    TOPICS
        .iter()
        .find(|(name, _)| *name == topic)
        .map(|(_, event)| *event)
}

fn simple_items<'a>(message: &'a Element, group: &str) -> Vec<(&'a str, &'a str)> {
    xml::find(message, group)
        .map(|group| {
            xml::find_all(group, "SimpleItem")
                .into_iter()
                .filter_map(|item| {
                    Some((
                        item.attributes.get("Name")?.as_str(),
                        item.attributes.get("Value")?.as_str(),
                    ))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn state_from_value(value: &str) -> Option<EventState> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "active" | "on" => Some(EventState::Active),
        "false" | "0" | "inactive" | "off" => Some(EventState::Inactive),
        _ => None,
    }
}

fn decode_notification(notification: &Element) -> Option<EventReport> {
    let topic = xml::text(notification, "Topic")?;
    let message = xml::find(notification, "Message")?;
    let data = simple_items(message, "Data");
    // Pulse topics such as line crossing carry no boolean state
    let state = data
        .iter()
        .find_map(|(_, value)| state_from_value(value))
        .unwrap_or(EventState::Active);

    if strip_prefixes(&topic) == DIGITAL_INPUT {
        let token = simple_items(message, "Source")
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("InputToken"))?
            .1;
        let digits: String = token.chars().filter(char::is_ascii_digit).collect();
        let input: u8 = digits.parse().ok()?;
        return CameraEvent::from_sensor_input(input).map(|event| (event, state));
    }

    event_for_topic(&topic).map(|event| (event, state))
}

/// Decode every recognized notification in a `PullMessagesResponse`
///
/// Unknown topics are dropped. When the same event appears more than once,
/// the last message wins.
pub fn parse_pull_messages(body: &str) -> Result<Vec<EventReport>> {
    let root = parse_envelope(body)?;
    if xml::find(&root, "PullMessagesResponse").is_none() {
        return Err(ApiError::ParseError("not a PullMessagesResponse".to_string()));
    }
    let mut reports: Vec<EventReport> = Vec::new();
    for notification in xml::find_all(&root, "NotificationMessage") {
        if let Some((event, state)) = decode_notification(notification) {
            reports.retain(|(seen, _)| *seen != event);
            reports.push((event, state));
        }
    }
    Ok(reports)
}
