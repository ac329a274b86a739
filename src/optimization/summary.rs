//! Heuristic conversation summaries
//!
//! Pure text extraction, no model call. Used to compress the older part of a
//! long history before it is trimmed to the token budget.

use super::history::truncate_chars;
use crate::api::Message;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

const MAX_TOPICS: usize = 5;
const MAX_KEY_POINTS: usize = 3;
const KEY_POINT_CHARS: usize = 120;
const MAX_EXTRACTED: usize = 10;

/// Keyword -> topic, checked in this order
const TOPIC_KEYWORDS: &[(&str, &str)] = &[
    ("production", "production"),
    ("output", "production"),
    ("shift", "production"),
    ("machine", "maintenance"),
    ("maintenance", "maintenance"),
    ("downtime", "maintenance"),
    ("inventory", "inventory"),
    ("stock", "inventory"),
    ("vendor", "procurement"),
    ("supplier", "procurement"),
    ("quotation", "procurement"),
    ("quote", "procurement"),
    ("purchase order", "procurement"),
    ("invoice", "finance"),
    ("payment", "finance"),
    ("gst", "tax"),
    ("tax", "tax"),
    ("shipment", "logistics"),
    ("delivery", "logistics"),
    ("dispatch", "logistics"),
    ("quality", "quality"),
    ("defect", "quality"),
    ("rejection", "quality"),
    ("forecast", "planning"),
    ("demand", "planning"),
    ("efficiency", "efficiency"),
    ("oee", "efficiency"),
];

const ACTION_MARKERS: &[&str] = &[
    "need to",
    "needs to",
    "should",
    "must",
    "please",
    "follow up",
    "follow-up",
    "deadline",
    "action",
    "todo",
    "remind",
];

/// Indian GST identification number
pub(crate) static GSTIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{2}[A-Z]{5}\d{4}[A-Z][1-9A-Z]Z[0-9A-Z]\b").expect("valid GSTIN regex")
});

/// Indian permanent account number
pub(crate) static PAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]{5}\d{4}[A-Z]\b").expect("valid PAN regex"));

static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:₹|\brs\.?|\binr|\busd|\$|€|\beur)\s?\d[\d,]*(?:\.\d+)?(?:\s?(?:lakhs?|crores?|k|m)\b)?")
        .expect("valid amount regex")
});

/// Entities pulled out of the conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedContext {
    pub topics: Vec<String>,
    pub amounts: Vec<String>,
    pub identifiers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub summary: String,
    pub key_points: Vec<String>,
    pub extracted_context: ExtractedContext,
}

impl ConversationSummary {
    /// Render as the content of a single system message
    pub fn to_message(&self) -> Message {
        let mut text = format!("Earlier conversation: {}.", self.summary);
        if !self.key_points.is_empty() {
            text.push_str(" Open items: ");
            text.push_str(&self.key_points.join(" | "));
        }
        if !self.extracted_context.identifiers.is_empty() {
            text.push_str(" Identifiers: ");
            text.push_str(&self.extracted_context.identifiers.join(", "));
        }
        Message::system(text)
    }
}

pub fn summarize_conversation(messages: &[Message]) -> ConversationSummary {
    if messages.is_empty() {
        return ConversationSummary {
            summary: "no prior conversation".to_string(),
            ..Default::default()
        };
    }

    let mut topics: Vec<String> = Vec::new();
    let mut key_points = Vec::new();
    let mut amounts: Vec<String> = Vec::new();
    let mut identifiers: Vec<String> = Vec::new();

    for message in messages {
        let lower = message.content.to_lowercase();

        for (keyword, topic) in TOPIC_KEYWORDS {
            if topics.len() < MAX_TOPICS
                && lower.contains(keyword)
                && !topics.iter().any(|t| t == topic)
            {
                topics.push(topic.to_string());
            }
        }

        for line in message.content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if key_points.len() >= MAX_KEY_POINTS {
                break;
            }
            let line_lower = line.to_lowercase();
            if ACTION_MARKERS.iter().any(|marker| line_lower.contains(marker)) {
                key_points.push(truncate_chars(line, KEY_POINT_CHARS));
            }
        }

        for found in AMOUNT_RE.find_iter(&message.content) {
            push_unique(&mut amounts, found.as_str().trim());
        }
        for found in GSTIN_RE.find_iter(&message.content) {
            push_unique(&mut identifiers, found.as_str());
        }
        for found in PAN_RE.find_iter(&message.content) {
            push_unique(&mut identifiers, found.as_str());
        }
    }

    let noun = if messages.len() == 1 { "message" } else { "messages" };
    let summary = if topics.is_empty() {
        format!("{} {} of general discussion", messages.len(), noun)
    } else {
        format!("{} {} covering {}", messages.len(), noun, topics.join(", "))
    };

    ConversationSummary {
        summary,
        key_points,
        extracted_context: ExtractedContext {
            topics,
            amounts,
            identifiers,
        },
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if list.len() < MAX_EXTRACTED && !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}
