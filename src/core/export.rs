//! CSV export of a page session.
//!
//! Control logs are flattened into one row list, sorted by timestamp (ties
//! in recording order) and rendered as a fully quoted, `\n`-joined CSV
//! document:
//!
//! ```text
//! "timestamp","time string","questionId","sliderId","eventType","value"
//! "1700000000000","2023-11-14T22:13:20.000Z","QID1","0","value","10"
//! ```
//!
//! The `time string` column can be switched off with [`CsvLayout`].

use crate::recorder::{
    ControlId, ControlLog, HoverKind, ParticipantId, QuestionId, QuestionLog, SelectionKind, Seq,
    SessionState, TimestampMs,
};
use chrono::{DateTime, SecondsFormat, Utc};
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Header with the optional time string column.
pub const HEADER: [&str; 6] = [
    "timestamp",
    "time string",
    "questionId",
    "sliderId",
    "eventType",
    "value",
];

/// Header without the time string column.
pub const HEADER_COMPACT: [&str; 5] = ["timestamp", "questionId", "sliderId", "eventType", "value"];

/// Suffix of every export filename.
pub const FILENAME_SUFFIX: &str = "interactions.csv";

/// Errors that can occur while rendering or reading an export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Malformed export row {row}: {reason}")]
    Malformed { row: usize, reason: String },

    #[error("Question {0} is not on this page")]
    UnknownQuestion(QuestionId),
}

/// Event type column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Value,
    Enter,
    Leave,
    Select,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Value => "value",
            EventType::Enter => "enter",
            EventType::Leave => "leave",
            EventType::Select => "select",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "value" => Ok(EventType::Value),
            "enter" => Ok(EventType::Enter),
            "leave" => Ok(EventType::Leave),
            "select" => Ok(EventType::Select),
            other => Err(format!("unknown event type '{other}'")),
        }
    }
}

impl From<HoverKind> for EventType {
    fn from(kind: HoverKind) -> Self {
        match kind {
            HoverKind::Enter => EventType::Enter,
            HoverKind::Leave => EventType::Leave,
        }
    }
}

impl From<SelectionKind> for EventType {
    fn from(kind: SelectionKind) -> Self {
        match kind {
            SelectionKind::Enter => EventType::Enter,
            SelectionKind::Leave => EventType::Leave,
            SelectionKind::Select => EventType::Select,
        }
    }
}

/// One flattened CSV row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub timestamp: TimestampMs,
    pub question_id: QuestionId,
    pub control_id: ControlId,
    pub event_type: EventType,
    /// Set for `value` rows, and for hover rows when hover values are kept
    pub value: Option<f64>,
}

/// Column layout of the export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvLayout {
    /// Include the ISO-8601 `time string` column
    pub time_string: bool,
}

impl Default for CsvLayout {
    fn default() -> Self {
        Self { time_string: true }
    }
}

/// A rendered export ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub filename: String,
    pub csv: String,
    pub row_count: usize,
}

impl Export {
    /// Render the whole session and derive its filename.
    pub fn build(session: &SessionState, layout: CsvLayout) -> Result<Self, ExportError> {
        Self::from_rows(
            collect_rows(session),
            export_filename(session.participant(), &session.question_ids()),
            layout,
        )
    }

    /// Render one question of the session, named after that question alone.
    pub fn build_question(
        session: &SessionState,
        question: &QuestionId,
        layout: CsvLayout,
    ) -> Result<Self, ExportError> {
        let log = session
            .question(question)
            .ok_or_else(|| ExportError::UnknownQuestion(question.clone()))?;
        Self::from_rows(
            collect_question_rows(log),
            export_filename(session.participant(), &[question]),
            layout,
        )
    }

    fn from_rows(
        rows: Vec<ExportRow>,
        filename: String,
        layout: CsvLayout,
    ) -> Result<Self, ExportError> {
        let csv = render_csv(&rows, layout)?;
        Ok(Self {
            filename,
            csv,
            row_count: rows.len(),
        })
    }
}

/// Flatten every control log into rows sorted by timestamp.
///
/// Rows with equal timestamps keep the order they were recorded in, across
/// questions and controls.
pub fn collect_rows(session: &SessionState) -> Vec<ExportRow> {
    let mut stamped = Vec::with_capacity(session.event_count());
    for question in session.questions() {
        flatten_question(question, &mut stamped);
    }
    into_sorted_rows(stamped)
}

/// Rows of a single question, ordered as in [`collect_rows`].
pub fn collect_question_rows(question: &QuestionLog) -> Vec<ExportRow> {
    let mut stamped = Vec::with_capacity(question.event_count());
    flatten_question(question, &mut stamped);
    into_sorted_rows(stamped)
}

fn flatten_question(question: &QuestionLog, out: &mut Vec<(Seq, ExportRow)>) {
    for (control_id, log) in question.controls() {
        let row = |timestamp, event_type, value| ExportRow {
            timestamp,
            question_id: question.question_id().clone(),
            control_id: control_id.clone(),
            event_type,
            value,
        };

        match log {
            ControlLog::Slider { values, hovers } => {
                out.extend(
                    values
                        .iter()
                        .map(|v| (v.seq, row(v.timestamp, EventType::Value, Some(v.value)))),
                );
                out.extend(
                    hovers
                        .iter()
                        .map(|h| (h.seq, row(h.timestamp, h.kind.into(), h.value))),
                );
            }
            ControlLog::Choice { events } => {
                out.extend(
                    events
                        .iter()
                        .map(|e| (e.seq, row(e.timestamp, e.kind.into(), None))),
                );
            }
        }
    }
}

fn into_sorted_rows(mut stamped: Vec<(Seq, ExportRow)>) -> Vec<ExportRow> {
    stamped.sort_by_key(|(seq, row)| (row.timestamp, *seq));
    stamped.into_iter().map(|(_, row)| row).collect()
}

/// Render the whole session as CSV text.
pub fn export_csv(session: &SessionState, layout: CsvLayout) -> Result<String, ExportError> {
    render_csv(&collect_rows(session), layout)
}

/// Render rows as CSV text. The header is always present.
pub fn render_csv(rows: &[ExportRow], layout: CsvLayout) -> Result<String, ExportError> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    if layout.time_string {
        writer.write_record(HEADER)?;
    } else {
        writer.write_record(HEADER_COMPACT)?;
    }

    for row in rows {
        let timestamp = row.timestamp.to_string();
        let value = row.value.map(format_value).unwrap_or_default();
        let event_type = row.event_type.as_str();

        if layout.time_string {
            writer.write_record([
                timestamp.as_str(),
                time_string(row.timestamp).as_str(),
                row.question_id.as_str(),
                row.control_id.as_str(),
                event_type,
                value.as_str(),
            ])?;
        } else {
            writer.write_record([
                timestamp.as_str(),
                row.question_id.as_str(),
                row.control_id.as_str(),
                event_type,
                value.as_str(),
            ])?;
        }
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    let mut text = String::from_utf8(bytes)?;
    // Rows are newline-joined, not newline-terminated
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

/// Read an export back into rows. Accepts either layout.
pub fn parse_csv(text: &str) -> Result<Vec<ExportRow>, ExportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let header: Vec<&str> = headers.iter().collect();
    let offset = if header == HEADER {
        1
    } else if header == HEADER_COMPACT {
        0
    } else {
        return Err(ExportError::Malformed {
            row: 0,
            reason: format!("unexpected header {header:?}"),
        });
    };

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let malformed = move |reason: String| ExportError::Malformed { row, reason };
        let field = |idx: usize| {
            record
                .get(idx)
                .ok_or_else(|| malformed(format!("missing column {idx}")))
        };

        let timestamp = field(0)?
            .parse::<TimestampMs>()
            .map_err(|e| malformed(format!("bad timestamp: {e}")))?;
        let question_id = QuestionId::new(field(1 + offset)?);
        let control_id = ControlId::new(field(2 + offset)?);
        let event_type = field(3 + offset)?.parse::<EventType>().map_err(malformed)?;
        let value = match field(4 + offset)? {
            "" => None,
            v => Some(
                v.parse::<f64>()
                    .map_err(|e| malformed(format!("bad value: {e}")))?,
            ),
        };

        rows.push(ExportRow {
            timestamp,
            question_id,
            control_id,
            event_type,
            value,
        });
    }

    Ok(rows)
}

/// ISO-8601 UTC with milliseconds, e.g. `2023-11-14T22:13:20.000Z`.
///
/// Timestamps outside chrono's range render as an empty cell.
pub fn time_string(timestamp: TimestampMs) -> String {
    match DateTime::<Utc>::from_timestamp_millis(timestamp) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => {
            warn!(timestamp, "timestamp out of range, leaving time string empty");
            String::new()
        }
    }
}

/// Shortest round-trip rendering: `10`, `0.5`, `-3.25`.
pub fn format_value(value: f64) -> String {
    value.to_string()
}

/// `{participant}_{question ids joined by "_"}_interactions.csv`.
///
/// A missing participant becomes an empty placeholder.
pub fn export_filename(participant: Option<&ParticipantId>, questions: &[&QuestionId]) -> String {
    let participant = participant.map(|p| p.as_str()).unwrap_or("");
    let questions: Vec<&str> = questions.iter().map(|q| q.as_str()).collect();
    format!("{participant}_{}_{FILENAME_SUFFIX}", questions.join("_"))
}
