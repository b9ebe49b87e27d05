//! Notification service payloads
//!
//! The watch takes a small XML document per update:
//!
//! ```text
//! <insert><pn>..</pn><id>..</id><an>..</an><ai>..</ai><su>..</su><bo>..</bo><vb>..</vb></insert>
//! <removed><id>..</id></removed>
//! ```
//!
//! `pn`, `an`, `ai`, `su` and `bo` are left out when empty.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

/// How the watch should vibrate for a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Vibration {
    Strong,
    #[default]
    Normal,
    Ringtone,
    None,
}

impl Vibration {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vibration::Strong => "strong",
            Vibration::Normal => "normal",
            Vibration::Ringtone => "ringtone",
            Vibration::None => "none",
        }
    }
}

/// A phone notification mirrored to the watch
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Notification {
    pub package_name: String,
    pub id: i32,
    pub application_name: String,
    pub application_icon: String,
    pub summary: String,
    pub body: String,
    pub vibration: Vibration,
}

impl Notification {
    /// Serializes the `insert` document.
    pub fn encode(&self) -> Vec<u8> {
        let mut xml = String::from("<insert>");
        push_optional(&mut xml, "pn", &self.package_name);
        push_element(&mut xml, "id", &self.id.to_string());
        push_optional(&mut xml, "an", &self.application_name);
        push_optional(&mut xml, "ai", &self.application_icon);
        push_optional(&mut xml, "su", &self.summary);
        push_optional(&mut xml, "bo", &self.body);
        push_element(&mut xml, "vb", self.vibration.as_str());
        xml.push_str("</insert>");
        xml.into_bytes()
    }
}

/// Serializes the `removed` document dismissing notification `id`.
pub fn encode_dismissal(id: i32) -> Vec<u8> {
    let mut xml = String::from("<removed>");
    push_element(&mut xml, "id", &id.to_string());
    xml.push_str("</removed>");
    xml.into_bytes()
}

fn push_optional(xml: &mut String, tag: &str, value: &str) {
    if !value.is_empty() {
        push_element(xml, tag, value);
    }
}

fn push_element(xml: &mut String, tag: &str, value: &str) {
    let _ = write!(xml, "<{tag}>{}</{tag}>", escape(value));
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
