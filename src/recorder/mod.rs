//! Interaction recording.
//!
//! The [`Recorder`] holds only policy. The page's [`SessionState`] is owned by
//! the caller and passed into every operation.

pub mod log;
pub mod types;

pub use log::{ControlLog, QuestionLog, SessionState};
pub use types::{
    ControlId, ControlKind, ControlRef, HoverEvent, HoverKind, ParticipantId, QuestionId,
    SelectionEvent, SelectionKind, Seq, TimestampMs, ValueChangeEvent,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors raised by recording operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecorderError {
    #[error("Unknown control: {0}")]
    UnknownControl(ControlRef),

    #[error("Control {control} is a {actual:?}, not a {expected:?}")]
    KindMismatch {
        control: ControlRef,
        expected: ControlKind,
        actual: ControlKind,
    },
}

/// When a slider value change is worth recording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueGating {
    /// Record whenever the value differs from the last recorded one.
    #[default]
    OnChange,
    /// As `OnChange`, but only once the pointer has hovered the slider.
    /// Filters out value changes caused by page initialisation.
    AfterHover,
}

/// Recording policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderOptions {
    pub value_gating: ValueGating,
    /// Keep the slider value reported alongside hover events
    pub include_hover_value: bool,
    /// Record enter/leave at all; when off, only values and selections are kept
    pub record_hover_events: bool,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            value_gating: ValueGating::OnChange,
            include_hover_value: false,
            record_hover_events: true,
        }
    }
}

/// What happened to a recorded notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Appended,
    /// Same value as the last recorded one
    Duplicate,
    /// Suppressed by [`ValueGating::AfterHover`]
    Gated,
    /// Hover recording is switched off
    Ignored,
}

impl Outcome {
    pub fn is_appended(self) -> bool {
        self == Outcome::Appended
    }
}

/// Result of a selection notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// More interaction may follow.
    Pending,
    /// A choice was selected; the question is finished and should be exported.
    Terminal,
    /// Hover on a choice while hover recording is switched off.
    Ignored,
}

/// Applies recording policy to a page session.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    options: RecorderOptions,
}

impl Recorder {
    pub fn new(options: RecorderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RecorderOptions {
        &self.options
    }

    /// Record a slider value.
    pub fn record_value_change(
        &self,
        session: &mut SessionState,
        control: &ControlRef,
        timestamp: TimestampMs,
        value: f64,
    ) -> Result<Outcome, RecorderError> {
        let gate_on_hover =
            self.options.value_gating == ValueGating::AfterHover && self.options.record_hover_events;

        let seq = session.issue_seq();
        let log = lookup(session, control)?;
        let kind_found = log.kind();
        let ControlLog::Slider { values, hovers } = log else {
            return Err(mismatch(control, ControlKind::Slider, kind_found));
        };

        if gate_on_hover && hovers.is_empty() {
            return Ok(Outcome::Gated);
        }
        if values.last().map(|v| v.value) == Some(value) {
            return Ok(Outcome::Duplicate);
        }

        values.push(ValueChangeEvent {
            seq,
            timestamp,
            value,
        });
        debug!(control = %control, timestamp, value, "value recorded");
        Ok(Outcome::Appended)
    }

    /// Record the pointer entering or leaving a slider.
    pub fn record_hover_event(
        &self,
        session: &mut SessionState,
        control: &ControlRef,
        timestamp: TimestampMs,
        kind: HoverKind,
        current_value: Option<f64>,
    ) -> Result<Outcome, RecorderError> {
        let seq = session.issue_seq();
        let log = lookup(session, control)?;
        let kind_found = log.kind();
        let ControlLog::Slider { hovers, .. } = log else {
            return Err(mismatch(control, ControlKind::Slider, kind_found));
        };

        if !self.options.record_hover_events {
            return Ok(Outcome::Ignored);
        }

        let value = if self.options.include_hover_value {
            current_value
        } else {
            None
        };
        hovers.push(HoverEvent {
            seq,
            timestamp,
            kind,
            value,
        });
        debug!(control = %control, timestamp, ?kind, "hover recorded");
        Ok(Outcome::Appended)
    }

    /// Record an interaction with a discrete choice.
    ///
    /// A `Select` finishes the question; the caller should export right after.
    pub fn record_selection(
        &self,
        session: &mut SessionState,
        control: &ControlRef,
        timestamp: TimestampMs,
        kind: SelectionKind,
    ) -> Result<Completion, RecorderError> {
        let seq = session.issue_seq();
        let log = lookup(session, control)?;
        let kind_found = log.kind();
        let ControlLog::Choice { events } = log else {
            return Err(mismatch(control, ControlKind::Choice, kind_found));
        };

        if kind != SelectionKind::Select && !self.options.record_hover_events {
            return Ok(Completion::Ignored);
        }

        events.push(SelectionEvent {
            seq,
            timestamp,
            kind,
        });
        debug!(control = %control, timestamp, ?kind, "selection recorded");

        if kind == SelectionKind::Select {
            Ok(Completion::Terminal)
        } else {
            Ok(Completion::Pending)
        }
    }
}

fn lookup<'a>(
    session: &'a mut SessionState,
    control: &ControlRef,
) -> Result<&'a mut ControlLog, RecorderError> {
    session
        .control_mut(control)
        .ok_or_else(|| RecorderError::UnknownControl(control.clone()))
}

fn mismatch(control: &ControlRef, expected: ControlKind, actual: ControlKind) -> RecorderError {
    RecorderError::KindMismatch {
        control: control.clone(),
        expected,
        actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slider_session() -> (SessionState, ControlRef) {
        let mut session = SessionState::new(None);
        let slider = ControlRef::new("Q1", "0");
        session.register_control(&slider, ControlKind::Slider);
        (session, slider)
    }

    fn recorded_values(session: &SessionState, control: &ControlRef) -> Vec<(i64, f64)> {
        match session.control(control) {
            Some(ControlLog::Slider { values, .. }) => {
                values.iter().map(|v| (v.timestamp, v.value)).collect()
            }
            _ => panic!("not a slider"),
        }
    }

    #[test]
    fn test_duplicate_values_are_suppressed() {
        let recorder = Recorder::default();
        let (mut session, slider) = slider_session();

        let outcomes: Vec<Outcome> = [(1, 10.0), (2, 10.0), (3, 20.0)]
            .iter()
            .map(|&(t, v)| {
                recorder
                    .record_value_change(&mut session, &slider, t, v)
                    .unwrap()
            })
            .collect();

        assert_eq!(
            outcomes,
            vec![Outcome::Appended, Outcome::Duplicate, Outcome::Appended]
        );
        assert_eq!(recorded_values(&session, &slider), vec![(1, 10.0), (3, 20.0)]);
    }

    #[test]
    fn test_returning_to_an_earlier_value_is_recorded() {
        let recorder = Recorder::default();
        let (mut session, slider) = slider_session();

        for (t, v) in [(1, 10.0), (2, 20.0), (3, 10.0)] {
            recorder
                .record_value_change(&mut session, &slider, t, v)
                .unwrap();
        }
        assert_eq!(recorded_values(&session, &slider).len(), 3);
    }

    #[test]
    fn test_after_hover_gating() {
        let recorder = Recorder::new(RecorderOptions {
            value_gating: ValueGating::AfterHover,
            ..Default::default()
        });
        let (mut session, slider) = slider_session();

        let gated = recorder
            .record_value_change(&mut session, &slider, 1, 50.0)
            .unwrap();
        assert_eq!(gated, Outcome::Gated);

        recorder
            .record_hover_event(&mut session, &slider, 2, HoverKind::Enter, Some(50.0))
            .unwrap();
        let appended = recorder
            .record_value_change(&mut session, &slider, 3, 50.0)
            .unwrap();
        assert_eq!(appended, Outcome::Appended);
        assert_eq!(recorded_values(&session, &slider), vec![(3, 50.0)]);
    }

    #[test]
    fn test_after_hover_gating_is_bypassed_without_hover_recording() {
        let recorder = Recorder::new(RecorderOptions {
            value_gating: ValueGating::AfterHover,
            record_hover_events: false,
            ..Default::default()
        });
        let (mut session, slider) = slider_session();

        let outcome = recorder
            .record_value_change(&mut session, &slider, 1, 5.0)
            .unwrap();
        assert_eq!(outcome, Outcome::Appended);
    }

    #[test]
    fn test_hover_value_is_configurable() {
        let (mut session, slider) = slider_session();

        Recorder::default()
            .record_hover_event(&mut session, &slider, 1, HoverKind::Enter, Some(3.0))
            .unwrap();
        Recorder::new(RecorderOptions {
            include_hover_value: true,
            ..Default::default()
        })
        .record_hover_event(&mut session, &slider, 2, HoverKind::Leave, Some(4.0))
        .unwrap();

        let Some(ControlLog::Slider { hovers, .. }) = session.control(&slider) else {
            panic!("not a slider");
        };
        assert_eq!(hovers[0].value, None);
        assert_eq!(hovers[1].value, Some(4.0));
    }

    #[test]
    fn test_unknown_control() {
        let recorder = Recorder::default();
        let mut session = SessionState::new(None);
        let missing = ControlRef::new("Q9", "3");

        let err = recorder
            .record_value_change(&mut session, &missing, 1, 1.0)
            .unwrap_err();
        assert_eq!(err, RecorderError::UnknownControl(missing.clone()));
        assert!(err.to_string().contains("Q9~3"));
    }

    #[test]
    fn test_kind_mismatch() {
        let recorder = Recorder::default();
        let (mut session, slider) = slider_session();

        let err = recorder
            .record_selection(&mut session, &slider, 1, SelectionKind::Select)
            .unwrap_err();
        assert!(matches!(err, RecorderError::KindMismatch { .. }));
    }

    #[test]
    fn test_select_is_terminal() {
        let recorder = Recorder::default();
        let mut session = SessionState::new(None);
        let choice = ControlRef::new("QID3", "2");
        session.register_control(&choice, ControlKind::Choice);

        let enter = recorder
            .record_selection(&mut session, &choice, 1, SelectionKind::Enter)
            .unwrap();
        assert_eq!(enter, Completion::Pending);

        let select = recorder
            .record_selection(&mut session, &choice, 2, SelectionKind::Select)
            .unwrap();
        assert_eq!(select, Completion::Terminal);

        // Selecting again re-finishes the question
        let again = recorder
            .record_selection(&mut session, &choice, 3, SelectionKind::Select)
            .unwrap();
        assert_eq!(again, Completion::Terminal);
        assert_eq!(session.event_count(), 3);
    }

    #[test]
    fn test_events_carry_recording_order() {
        let recorder = Recorder::default();
        let (mut session, slider) = slider_session();

        recorder
            .record_hover_event(&mut session, &slider, 9, HoverKind::Enter, None)
            .unwrap();
        recorder
            .record_value_change(&mut session, &slider, 9, 1.0)
            .unwrap();

        let Some(ControlLog::Slider { values, hovers }) = session.control(&slider) else {
            panic!("not a slider");
        };
        assert!(hovers[0].seq < values[0].seq);
    }

    #[test]
    fn test_choice_hover_can_be_disabled() {
        let recorder = Recorder::new(RecorderOptions {
            record_hover_events: false,
            ..Default::default()
        });
        let mut session = SessionState::new(None);
        let choice = ControlRef::new("QID3", "1");
        session.register_control(&choice, ControlKind::Choice);

        let enter = recorder
            .record_selection(&mut session, &choice, 1, SelectionKind::Enter)
            .unwrap();
        let select = recorder
            .record_selection(&mut session, &choice, 2, SelectionKind::Select)
            .unwrap();

        assert_eq!(enter, Completion::Ignored);
        assert_eq!(select, Completion::Terminal);
        assert_eq!(session.event_count(), 1);
    }
}
