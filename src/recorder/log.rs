//! Per-page event logs.
//!
//! A [`SessionState`] lives for one page view. It owns one [`QuestionLog`] per
//! question on the page, each owning one [`ControlLog`] per tracked control.
//! Questions and controls keep their registration order. Every recorded
//! event is stamped with a session-wide sequence number, which orders events
//! that share a timestamp.

use crate::recorder::types::{
    ControlId, ControlKind, ControlRef, HoverEvent, ParticipantId, QuestionId, SelectionEvent,
    Seq, ValueChangeEvent,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Event sequences for one control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlLog {
    Slider {
        /// Value changes; no two consecutive entries share a value
        values: Vec<ValueChangeEvent>,
        hovers: Vec<HoverEvent>,
    },
    Choice {
        events: Vec<SelectionEvent>,
    },
}

impl ControlLog {
    pub fn new(kind: ControlKind) -> Self {
        match kind {
            ControlKind::Slider => ControlLog::Slider {
                values: Vec::new(),
                hovers: Vec::new(),
            },
            ControlKind::Choice => ControlLog::Choice { events: Vec::new() },
        }
    }

    pub fn kind(&self) -> ControlKind {
        match self {
            ControlLog::Slider { .. } => ControlKind::Slider,
            ControlLog::Choice { .. } => ControlKind::Choice,
        }
    }

    pub fn event_count(&self) -> usize {
        match self {
            ControlLog::Slider { values, hovers } => values.len() + hovers.len(),
            ControlLog::Choice { events } => events.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.event_count() == 0
    }
}

/// All control logs of one question.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionLog {
    question_id: QuestionId,
    controls: Vec<(ControlId, ControlLog)>,
    #[serde(skip)]
    index: HashMap<ControlId, usize>,
}

impl QuestionLog {
    pub fn new(question_id: QuestionId) -> Self {
        Self {
            question_id,
            controls: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn question_id(&self) -> &QuestionId {
        &self.question_id
    }

    /// Register a control. Returns `false` if it already existed.
    pub fn register(&mut self, control: ControlId, kind: ControlKind) -> bool {
        if self.index.contains_key(&control) {
            return false;
        }
        self.index.insert(control.clone(), self.controls.len());
        self.controls.push((control, ControlLog::new(kind)));
        true
    }

    pub fn control(&self, control: &ControlId) -> Option<&ControlLog> {
        self.index.get(control).map(|&i| &self.controls[i].1)
    }

    pub fn control_mut(&mut self, control: &ControlId) -> Option<&mut ControlLog> {
        let i = *self.index.get(control)?;
        Some(&mut self.controls[i].1)
    }

    /// Controls in registration order.
    pub fn controls(&self) -> impl Iterator<Item = (&ControlId, &ControlLog)> {
        self.controls.iter().map(|(id, log)| (id, log))
    }

    pub fn control_count(&self) -> usize {
        self.controls.len()
    }

    pub fn event_count(&self) -> usize {
        self.controls.iter().map(|(_, log)| log.event_count()).sum()
    }
}

/// Everything recorded during one page view.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    participant: Option<ParticipantId>,
    questions: Vec<QuestionLog>,
    #[serde(skip)]
    index: HashMap<QuestionId, usize>,
    next_seq: Seq,
}

impl SessionState {
    /// Create a fresh session for a page load.
    pub fn new(participant: Option<ParticipantId>) -> Self {
        Self {
            participant,
            questions: Vec::new(),
            index: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Hand out the next sequence number. Numbers increase but may skip.
    pub(crate) fn issue_seq(&mut self) -> Seq {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn participant(&self) -> Option<&ParticipantId> {
        self.participant.as_ref()
    }

    pub fn set_participant(&mut self, participant: ParticipantId) {
        self.participant = Some(participant);
    }

    /// Register a question block, creating an empty log if needed.
    pub fn register_question(&mut self, question: QuestionId) -> &mut QuestionLog {
        let i = match self.index.get(&question) {
            Some(&i) => i,
            None => {
                let i = self.questions.len();
                self.index.insert(question.clone(), i);
                self.questions.push(QuestionLog::new(question));
                i
            }
        };
        &mut self.questions[i]
    }

    /// Register a control, creating its question on demand.
    ///
    /// Returns `false` if the control was already registered; its existing
    /// log (and kind) is kept.
    pub fn register_control(&mut self, control: &ControlRef, kind: ControlKind) -> bool {
        self.register_question(control.question.clone())
            .register(control.control.clone(), kind)
    }

    pub fn question(&self, question: &QuestionId) -> Option<&QuestionLog> {
        self.index.get(question).map(|&i| &self.questions[i])
    }

    pub fn question_mut(&mut self, question: &QuestionId) -> Option<&mut QuestionLog> {
        let i = *self.index.get(question)?;
        Some(&mut self.questions[i])
    }

    pub fn control(&self, control: &ControlRef) -> Option<&ControlLog> {
        self.question(&control.question)
            .and_then(|q| q.control(&control.control))
    }

    pub fn control_mut(&mut self, control: &ControlRef) -> Option<&mut ControlLog> {
        self.question_mut(&control.question)
            .and_then(|q| q.control_mut(&control.control))
    }

    /// Questions in registration order.
    pub fn questions(&self) -> impl Iterator<Item = &QuestionLog> {
        self.questions.iter()
    }

    pub fn question_ids(&self) -> Vec<&QuestionId> {
        self.questions.iter().map(|q| q.question_id()).collect()
    }

    /// Whether any control is tracked on this page.
    pub fn has_controls(&self) -> bool {
        self.questions.iter().any(|q| q.control_count() > 0)
    }

    pub fn event_count(&self) -> usize {
        self.questions.iter().map(|q| q.event_count()).sum()
    }
}
