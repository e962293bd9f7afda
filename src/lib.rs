//! Survey Interaction Recorder - interaction telemetry for survey pages.
//!
//! This library records how participants interact with survey controls
//! (slider drags, pointer hover, multiple-choice clicks), buffers the
//! timestamped events for the lifetime of a page, and exports them as a CSV
//! file keyed by participant id.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Survey Interaction Recorder                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │ Host page   │──▶│  Adapter    │──▶│  Recorder   │       │
//! │  │ (notify)    │   │ (id parse)  │   │ (session)   │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                           │                 │               │
//! │                           ▼                 ▼               │
//! │                    ┌─────────────┐   ┌─────────────┐       │
//! │                    │Transparency │   │ CSV Export  │       │
//! │                    │    Log      │   │ + Delivery  │       │
//! │                    └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use survey_interaction_recorder::{
//!     export_csv, ControlKind, ControlRef, CsvLayout, Recorder, SessionState,
//! };
//!
//! let recorder = Recorder::default();
//! let mut session = SessionState::new(None);
//! let slider = ControlRef::new("QID1", "0");
//! session.register_control(&slider, ControlKind::Slider);
//!
//! recorder.record_value_change(&mut session, &slider, 1, 10.0).unwrap();
//! recorder.record_value_change(&mut session, &slider, 2, 10.0).unwrap();
//!
//! let csv = export_csv(&session, CsvLayout { time_string: false }).unwrap();
//! assert_eq!(csv.lines().count(), 2);
//! ```

pub mod adapter;
pub mod config;
pub mod core;
pub mod delivery;
pub mod participant;
pub mod recorder;
pub mod source;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use adapter::{parse_element_id, AdapterError, Notification, PageAction, PageSession};
pub use config::{Config, ConfigError};
pub use core::{export_csv, export_filename, parse_csv, CsvLayout, EventType, Export, ExportRow};
pub use delivery::{DirectoryDelivery, FileDelivery};
pub use participant::{FileParticipantStore, MemoryParticipantStore, ParticipantStore};
pub use recorder::{
    ControlKind, ControlRef, HoverKind, ParticipantId, QuestionId, Recorder, RecorderError,
    RecorderOptions, SelectionKind, SessionState, ValueGating,
};
pub use source::{NotificationChannel, NotificationSender};
pub use transparency::{CollectionCounts, SharedTransparencyLog, TransparencyLog};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Data collection declaration that can be displayed to participants and operators.
pub const DATA_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║        SURVEY INTERACTION RECORDER - DATA DECLARATION            ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This recorder captures how survey controls are used.            ║
║                                                                  ║
║  ✓ WHAT WE CAPTURE:                                              ║
║    • Slider values, each time they change                        ║
║    • When the pointer enters or leaves a control                 ║
║    • Which choice was clicked, and when                          ║
║    • The participant id entered at the start of the survey       ║
║                                                                  ║
║  ✗ WHAT WE NEVER CAPTURE:                                        ║
║    • Pointer coordinates or movement paths                       ║
║    • Keystrokes or free-text answers                             ║
║    • Anything outside the tracked survey controls                ║
║                                                                  ║
║  Events are held in memory for one page only, then written       ║
║  to a CSV file named after the participant id.                   ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
