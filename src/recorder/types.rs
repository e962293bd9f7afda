//! Event and identifier types for the interaction recorder.
//!
//! Identifiers are opaque strings handed over by the host page. Events carry
//! millisecond timestamps (since the Unix epoch) exactly as the host reports them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds since the Unix epoch.
pub type TimestampMs = i64;

/// Position of an event in its session's recording order.
pub type Seq = u64;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Participant identifier, set once and persisted across page loads.
    ParticipantId
);
string_id!(
    /// Identifier of a question block on the current page.
    QuestionId
);
string_id!(
    /// Identifier of a control (slider index, choice index) within a question.
    ControlId
);

/// A structured `(question, control)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlRef {
    pub question: QuestionId,
    pub control: ControlId,
}

impl ControlRef {
    pub fn new(question: impl Into<QuestionId>, control: impl Into<ControlId>) -> Self {
        Self {
            question: question.into(),
            control: control.into(),
        }
    }
}

impl fmt::Display for ControlRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}~{}", self.question, self.control)
    }
}

/// Which kind of widget a control is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    /// Continuous control: value changes plus hover events.
    Slider,
    /// Discrete choice box: one unified enter/leave/select sequence.
    Choice,
}

/// A control's value at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueChangeEvent {
    pub seq: Seq,
    pub timestamp: TimestampMs,
    pub value: f64,
}

/// Pointer hover direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoverKind {
    Enter,
    Leave,
}

/// A pointer entering or leaving a slider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoverEvent {
    pub seq: Seq,
    pub timestamp: TimestampMs,
    pub kind: HoverKind,
    /// Slider value at hover time, when the recorder is configured to keep it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// Interaction kind on a discrete choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    Enter,
    Leave,
    /// Terminal for the question; export follows.
    Select,
}

impl From<HoverKind> for SelectionKind {
    fn from(kind: HoverKind) -> Self {
        match kind {
            HoverKind::Enter => SelectionKind::Enter,
            HoverKind::Leave => SelectionKind::Leave,
        }
    }
}

/// An interaction with a discrete choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionEvent {
    pub seq: Seq,
    pub timestamp: TimestampMs,
    pub kind: SelectionKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_ref_display() {
        let r = ControlRef::new("QID4", "2");
        assert_eq!(r.to_string(), "QID4~2");
        assert_eq!(r.question.as_str(), "QID4");
        assert_eq!(r.control.as_str(), "2");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = QuestionId::new("QID7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"QID7\"");
    }

    #[test]
    fn test_hover_value_omitted_when_absent() {
        let event = HoverEvent {
            seq: 0,
            timestamp: 5,
            kind: HoverKind::Enter,
            value: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"seq":0,"timestamp":5,"kind":"enter"}"#);
    }
}
