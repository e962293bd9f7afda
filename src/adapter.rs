//! Host page adapter.
//!
//! The host page identifies controls by element ids such as `QID4~2` (slider
//! `2` of question `QID4`) or, for choice labels, `QR~QID4~2`. This module
//! splits those ids into [`ControlRef`]s and dispatches host notifications
//! into a [`PageSession`].
//!
//! Nothing here propagates an error to the host: failed notifications are
//! logged, counted and skipped.

use crate::core::export::{CsvLayout, Export, ExportError};
use crate::recorder::{
    Completion, ControlKind, ControlRef, HoverKind, Outcome, ParticipantId, QuestionId, Recorder,
    RecorderError, SelectionKind, SessionState, TimestampMs,
};
use crate::transparency::{SharedTransparencyLog, Tally};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Delimiter between the parts of an element id.
pub const ID_DELIMITER: char = '~';

/// Prefix the host puts in front of choice label ids.
const RESPONSE_PREFIX: &str = "QR";

/// Errors raised while translating host notifications.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Malformed element id: '{0}'")]
    MalformedIdentifier(String),

    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

/// Split an element id into its question and control parts.
///
/// Parts beyond the control are ignored, as the host appends suffixes to
/// some ids.
pub fn parse_element_id(element: &str) -> Result<ControlRef, AdapterError> {
    let mut parts = element.split(ID_DELIMITER).peekable();
    if parts.peek() == Some(&RESPONSE_PREFIX) {
        parts.next();
    }

    match (parts.next(), parts.next()) {
        (Some(question), Some(control)) if !question.is_empty() && !control.is_empty() => {
            Ok(ControlRef::new(question, control))
        }
        _ => Err(AdapterError::MalformedIdentifier(element.to_string())),
    }
}

/// Current time in milliseconds since the epoch.
pub fn now_ms() -> TimestampMs {
    Utc::now().timestamp_millis()
}

/// A notification delivered by the host page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A tracked control is present on the page.
    Register { element: String, kind: ControlKind },
    /// A slider's value changed.
    Value {
        element: String,
        timestamp: TimestampMs,
        value: f64,
    },
    /// Pointer entered a control; `value` is the slider value, if known.
    Enter {
        element: String,
        timestamp: TimestampMs,
        #[serde(default)]
        value: Option<f64>,
    },
    /// Pointer left a control.
    Leave {
        element: String,
        timestamp: TimestampMs,
        #[serde(default)]
        value: Option<f64>,
    },
    /// A choice was clicked.
    Click {
        element: String,
        timestamp: TimestampMs,
    },
    /// The participant entered their id.
    Participant { id: String },
    /// The participant moved on to the next page.
    Next,
}

/// What the host should do after a notification.
#[derive(Debug, Clone, PartialEq)]
pub enum PageAction {
    None,
    /// A choice was selected; deliver this export of its question now.
    Export(Export),
    /// The page is finished. Carries an export if the page tracked any controls.
    Navigate(Option<Export>),
    /// Persist this participant id for later pages.
    StoreParticipant(ParticipantId),
}

/// One page view: its session state plus the policy applied to it.
pub struct PageSession {
    state: SessionState,
    recorder: Recorder,
    layout: CsvLayout,
    transparency: Option<SharedTransparencyLog>,
    pending: bool,
}

impl PageSession {
    /// Start a page with the participant id read from the store, if any.
    pub fn new(recorder: Recorder, layout: CsvLayout, participant: Option<ParticipantId>) -> Self {
        Self {
            state: SessionState::new(participant),
            recorder,
            layout,
            transparency: None,
            pending: false,
        }
    }

    /// Count recorded events and exports in a transparency log.
    pub fn with_transparency(mut self, log: SharedTransparencyLog) -> Self {
        self.transparency = Some(log);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Whether events were recorded since the last export.
    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// Apply one notification. Never fails; problems are logged and skipped.
    pub fn handle(&mut self, notification: Notification) -> PageAction {
        match self.apply(notification) {
            Ok(action) => action,
            Err(e) => {
                warn!("Skipping notification: {e}");
                if let Some(ref log) = self.transparency {
                    log.tally(Tally::Skipped);
                }
                PageAction::None
            }
        }
    }

    /// Render the whole page's export, logging instead of failing.
    pub fn export(&mut self) -> Option<Export> {
        let export = Export::build(&self.state, self.layout);
        let export = self.finish_export(export, &self.state.question_ids())?;
        self.pending = false;
        Some(export)
    }

    /// Render one question's export, logging instead of failing.
    pub fn export_question(&mut self, question: &QuestionId) -> Option<Export> {
        let export = Export::build_question(&self.state, question, self.layout);
        let export = self.finish_export(export, &[question])?;
        // Other questions on the page are still unexported
        self.pending = self
            .state
            .questions()
            .any(|q| q.question_id() != question && q.event_count() > 0);
        Some(export)
    }

    fn finish_export(
        &self,
        export: Result<Export, ExportError>,
        questions: &[&QuestionId],
    ) -> Option<Export> {
        match export {
            Ok(export) => {
                info!(
                    filename = %export.filename,
                    rows = export.row_count,
                    "Export ready"
                );
                if let Some(ref log) = self.transparency {
                    log.record_export(questions);
                }
                Some(export)
            }
            Err(e) => {
                warn!("Export failed: {e}");
                None
            }
        }
    }

    fn apply(&mut self, notification: Notification) -> Result<PageAction, AdapterError> {
        match notification {
            Notification::Register { element, kind } => {
                let control = parse_element_id(&element)?;
                if !self.state.register_control(&control, kind) {
                    debug!(control = %control, "control already registered");
                }
                Ok(PageAction::None)
            }
            Notification::Value {
                element,
                timestamp,
                value,
            } => {
                let control = parse_element_id(&element)?;
                let outcome =
                    self.recorder
                        .record_value_change(&mut self.state, &control, timestamp, value)?;
                if outcome.is_appended() {
                    self.note_recorded(Tally::Value);
                }
                Ok(PageAction::None)
            }
            Notification::Enter {
                element,
                timestamp,
                value,
            } => self.hover(&element, timestamp, HoverKind::Enter, value),
            Notification::Leave {
                element,
                timestamp,
                value,
            } => self.hover(&element, timestamp, HoverKind::Leave, value),
            Notification::Click { element, timestamp } => {
                let control = parse_element_id(&element)?;
                self.select(&control, timestamp, SelectionKind::Select)
            }
            Notification::Participant { id } => {
                let id = ParticipantId::new(id.trim());
                if id.as_str().is_empty() {
                    return Ok(PageAction::None);
                }
                self.state.set_participant(id.clone());
                Ok(PageAction::StoreParticipant(id))
            }
            Notification::Next => {
                if !self.state.has_controls() {
                    return Ok(PageAction::Navigate(None));
                }
                Ok(PageAction::Navigate(self.export()))
            }
        }
    }

    fn hover(
        &mut self,
        element: &str,
        timestamp: TimestampMs,
        kind: HoverKind,
        value: Option<f64>,
    ) -> Result<PageAction, AdapterError> {
        let control = parse_element_id(element)?;
        let registered = self
            .state
            .control(&control)
            .map(|log| log.kind())
            .ok_or_else(|| RecorderError::UnknownControl(control.clone()))?;

        match registered {
            ControlKind::Slider => {
                let outcome = self.recorder.record_hover_event(
                    &mut self.state,
                    &control,
                    timestamp,
                    kind,
                    value,
                )?;
                if outcome == Outcome::Appended {
                    self.note_recorded(Tally::Hover);
                }
                Ok(PageAction::None)
            }
            ControlKind::Choice => self.select(&control, timestamp, kind.into()),
        }
    }

    fn select(
        &mut self,
        control: &ControlRef,
        timestamp: TimestampMs,
        kind: SelectionKind,
    ) -> Result<PageAction, AdapterError> {
        let completion = self
            .recorder
            .record_selection(&mut self.state, control, timestamp, kind)?;
        if completion != Completion::Ignored {
            self.note_recorded(Tally::Selection);
        }

        match completion {
            Completion::Terminal => Ok(self
                .export_question(&control.question)
                .map(PageAction::Export)
                .unwrap_or(PageAction::None)),
            Completion::Pending | Completion::Ignored => Ok(PageAction::None),
        }
    }

    fn note_recorded(&mut self, tally: Tally) {
        self.pending = true;
        if let Some(ref log) = self.transparency {
            log.tally(tally);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::export::{parse_csv, EventType};
    use crate::transparency::create_shared_log;

    fn page() -> PageSession {
        PageSession::new(
            Recorder::default(),
            CsvLayout::default(),
            Some(ParticipantId::new("P1")),
        )
    }

    fn register(page: &mut PageSession, element: &str, kind: ControlKind) {
        page.handle(Notification::Register {
            element: element.to_string(),
            kind,
        });
    }

    #[test]
    fn test_parse_slider_id() {
        assert_eq!(
            parse_element_id("QID12~3").unwrap(),
            ControlRef::new("QID12", "3")
        );
        assert_eq!(
            parse_element_id("QID12~3~handle").unwrap(),
            ControlRef::new("QID12", "3")
        );
    }

    #[test]
    fn test_parse_choice_label_id() {
        assert_eq!(
            parse_element_id("QR~QID5~2").unwrap(),
            ControlRef::new("QID5", "2")
        );
    }

    #[test]
    fn test_parse_malformed_ids() {
        for bad in ["", "QID1", "QID1~", "~2", "QR~QID1"] {
            assert!(
                matches!(
                    parse_element_id(bad),
                    Err(AdapterError::MalformedIdentifier(_))
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_unknown_control_is_skipped() {
        let log = create_shared_log();
        let mut page = page().with_transparency(log.clone());

        let action = page.handle(Notification::Value {
            element: "QID1~0".to_string(),
            timestamp: 1,
            value: 3.0,
        });

        assert_eq!(action, PageAction::None);
        assert_eq!(page.state().event_count(), 0);
        assert_eq!(log.counts().skipped_notifications, 1);
    }

    #[test]
    fn test_click_exports_question_with_select_last() {
        let mut page = page();
        register(&mut page, "QR~QID3~1", ControlKind::Choice);
        register(&mut page, "QR~QID3~2", ControlKind::Choice);

        page.handle(Notification::Enter {
            element: "QR~QID3~1".to_string(),
            timestamp: 10,
            value: None,
        });
        page.handle(Notification::Leave {
            element: "QR~QID3~1".to_string(),
            timestamp: 20,
            value: None,
        });
        page.handle(Notification::Enter {
            element: "QR~QID3~2".to_string(),
            timestamp: 30,
            value: None,
        });
        let action = page.handle(Notification::Click {
            element: "QR~QID3~2".to_string(),
            timestamp: 40,
        });

        let PageAction::Export(export) = action else {
            panic!("expected an export, got {action:?}");
        };
        assert_eq!(export.filename, "P1_QID3_interactions.csv");

        let rows = parse_csv(&export.csv).unwrap();
        assert_eq!(rows.len(), 4);
        let last = rows.last().unwrap();
        assert_eq!(last.event_type, EventType::Select);
        assert_eq!(last.control_id.as_str(), "2");
        assert!(!page.has_pending());
    }

    #[test]
    fn test_same_millisecond_click_is_last_row() {
        let mut page = page();
        register(&mut page, "QR~QID3~1", ControlKind::Choice);
        register(&mut page, "QR~QID3~2", ControlKind::Choice);

        page.handle(Notification::Enter {
            element: "QR~QID3~2".to_string(),
            timestamp: 40,
            value: None,
        });
        page.handle(Notification::Leave {
            element: "QR~QID3~2".to_string(),
            timestamp: 40,
            value: None,
        });
        page.handle(Notification::Enter {
            element: "QR~QID3~1".to_string(),
            timestamp: 40,
            value: None,
        });
        let PageAction::Export(export) = page.handle(Notification::Click {
            element: "QR~QID3~1".to_string(),
            timestamp: 40,
        }) else {
            panic!("expected an export");
        };

        let rows = parse_csv(&export.csv).unwrap();
        let order: Vec<(&str, EventType)> = rows
            .iter()
            .map(|r| (r.control_id.as_str(), r.event_type))
            .collect();
        assert_eq!(
            order,
            vec![
                ("2", EventType::Enter),
                ("2", EventType::Leave),
                ("1", EventType::Enter),
                ("1", EventType::Select),
            ]
        );
    }

    #[test]
    fn test_click_on_mixed_page_exports_only_its_question() {
        let log = create_shared_log();
        let mut page = page().with_transparency(log.clone());
        register(&mut page, "QID1~0", ControlKind::Slider);
        register(&mut page, "QR~QID2~0", ControlKind::Choice);

        page.handle(Notification::Value {
            element: "QID1~0".to_string(),
            timestamp: 5,
            value: 10.0,
        });
        let PageAction::Export(export) = page.handle(Notification::Click {
            element: "QR~QID2~0".to_string(),
            timestamp: 6,
        }) else {
            panic!("expected an export");
        };

        assert_eq!(export.filename, "P1_QID2_interactions.csv");
        let rows = parse_csv(&export.csv).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].question_id.as_str(), "QID2");
        assert_eq!(rows[0].event_type, EventType::Select);

        // The slider's value is still waiting for the page export
        assert!(page.has_pending());
        let PageAction::Navigate(Some(page_export)) = page.handle(Notification::Next) else {
            panic!("expected a page export");
        };
        assert_eq!(page_export.filename, "P1_QID1_QID2_interactions.csv");

        let counts = log.counts();
        assert_eq!(counts.exports.get(&QuestionId::new("QID1")), Some(&1));
        assert_eq!(counts.exports.get(&QuestionId::new("QID2")), Some(&2));
    }

    #[test]
    fn test_next_without_controls_does_not_export() {
        let mut page = page();
        assert_eq!(page.handle(Notification::Next), PageAction::Navigate(None));
    }

    #[test]
    fn test_next_exports_slider_page() {
        let log = create_shared_log();
        let mut page = page().with_transparency(log.clone());
        register(&mut page, "QID1~0", ControlKind::Slider);

        page.handle(Notification::Enter {
            element: "QID1~0".to_string(),
            timestamp: 5,
            value: Some(0.0),
        });
        page.handle(Notification::Value {
            element: "QID1~0".to_string(),
            timestamp: 3,
            value: 40.0,
        });
        assert!(page.has_pending());

        let PageAction::Navigate(Some(export)) = page.handle(Notification::Next) else {
            panic!("expected an export");
        };
        let rows = parse_csv(&export.csv).unwrap();
        assert_eq!(rows[0].event_type, EventType::Value);
        assert_eq!(rows[0].timestamp, 3);
        assert_eq!(rows[1].event_type, EventType::Enter);

        let counts = log.counts();
        assert_eq!(counts.value_events, 1);
        assert_eq!(counts.hover_events, 1);
        assert_eq!(counts.exports.get(&QuestionId::new("QID1")), Some(&1));
    }

    #[test]
    fn test_participant_entry() {
        let mut page = PageSession::new(Recorder::default(), CsvLayout::default(), None);

        let action = page.handle(Notification::Participant {
            id: "  P77 ".to_string(),
        });
        assert_eq!(action, PageAction::StoreParticipant(ParticipantId::new("P77")));
        assert_eq!(page.state().participant().map(|p| p.as_str()), Some("P77"));

        let blank = page.handle(Notification::Participant { id: " ".to_string() });
        assert_eq!(blank, PageAction::None);
    }

    #[test]
    fn test_notification_json() {
        let n: Notification =
            serde_json::from_str(r#"{"type":"value","element":"QID1~0","timestamp":7,"value":2.5}"#)
                .unwrap();
        assert_eq!(
            n,
            Notification::Value {
                element: "QID1~0".to_string(),
                timestamp: 7,
                value: 2.5
            }
        );

        let n: Notification =
            serde_json::from_str(r#"{"type":"enter","element":"QID1~0","timestamp":8}"#).unwrap();
        assert!(matches!(n, Notification::Enter { value: None, .. }));
    }
}
