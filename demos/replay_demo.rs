//! Demonstration of the interaction recorder.
//!
//! This example shows how to:
//! 1. Start a page session with a stored participant id
//! 2. Push host notifications through a notification channel
//! 3. Apply them to the page
//! 4. Export and print the resulting CSV
//!
//! Run with: cargo run --example replay_demo

use std::thread;
use std::time::Duration;

use survey_interaction_recorder::{
    adapter::now_ms,
    participant::{load_participant, MemoryParticipantStore, ParticipantStore},
    recorder::{ControlKind, ParticipantId, Recorder},
    source::NotificationChannel,
    transparency::TransparencyLog,
    CsvLayout, Notification, PageAction, PageSession, DATA_DECLARATION,
};

fn main() {
    println!("Survey Interaction Recorder - Replay Demo");
    println!("=========================================");
    println!();
    println!("{DATA_DECLARATION}");
    println!();

    let mut store = MemoryParticipantStore::new();
    if let Err(e) = store.set_participant(&ParticipantId::new("DEMO-01")) {
        eprintln!("Error storing participant id: {e}");
        return;
    }

    let transparency = std::sync::Arc::new(TransparencyLog::new());
    let mut page = PageSession::new(
        Recorder::default(),
        CsvLayout::default(),
        load_participant(&store),
    )
    .with_transparency(transparency.clone());

    let channel = NotificationChannel::new(1_000);
    let sender = channel.sender();

    // Simulated host: one slider question, dragged from 0 to 30 in steps of 10
    let host = thread::spawn(move || {
        let push = |n| {
            if let Err(e) = sender.notify_blocking(n) {
                eprintln!("Error pushing notification: {e}");
            }
        };

        push(Notification::Register {
            element: "QID1~1".to_string(),
            kind: ControlKind::Slider,
        });
        push(Notification::Enter {
            element: "QID1~1".to_string(),
            timestamp: now_ms(),
            value: Some(0.0),
        });
        for step in 0..=3 {
            thread::sleep(Duration::from_millis(20));
            // Every value is reported twice; duplicates are dropped
            for _ in 0..2 {
                push(Notification::Value {
                    element: "QID1~1".to_string(),
                    timestamp: now_ms(),
                    value: f64::from(step * 10),
                });
            }
        }
        push(Notification::Leave {
            element: "QID1~1".to_string(),
            timestamp: now_ms(),
            value: Some(30.0),
        });
        push(Notification::Next);
    });

    if host.join().is_err() {
        eprintln!("Simulated host panicked");
        return;
    }

    for action in channel.drain_into(&mut page) {
        if let PageAction::Navigate(Some(export)) = action {
            println!("File: {}", export.filename);
            println!();
            println!("{}", export.csv);
        }
    }

    println!();
    println!("{}", transparency.summary());
}
