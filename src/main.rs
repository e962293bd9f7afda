//! Survey Interaction Recorder CLI
//!
//! Replays host notification streams, manages the stored participant id and
//! inspects exported CSV files.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::thread;
use survey_interaction_recorder::{
    config::Config,
    core::{parse_csv, CsvLayout, EventType},
    delivery::{DirectoryDelivery, FileDelivery},
    participant::{load_participant, FileParticipantStore, ParticipantStore},
    recorder::{ParticipantId, Recorder, ValueGating},
    source::NotificationChannel,
    transparency::{create_shared_log_with_persistence, read_counts},
    Notification, PageAction, PageSession, DATA_DECLARATION, VERSION,
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "survey-recorder")]
#[command(version = VERSION)]
#[command(about = "Interaction telemetry recorder for survey pages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the stored participant id
    Participant {
        #[command(subcommand)]
        action: ParticipantCommand,
    },

    /// Replay a JSON-lines notification stream and export each page
    Replay {
        /// Notification stream, one JSON object per line
        file: PathBuf,

        /// Output directory for exports
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Leave out the ISO-8601 time string column
        #[arg(long)]
        no_time_string: bool,

        /// Override the value gating policy
        #[arg(long, value_enum)]
        gating: Option<GatingArg>,
    },

    /// Summarise an exported CSV file
    Inspect {
        /// Exported CSV file
        file: PathBuf,
    },

    /// Show collection statistics
    Status,

    /// Display the data collection declaration
    Privacy,

    /// Show configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        write: bool,
    },
}

#[derive(Subcommand)]
enum ParticipantCommand {
    /// Store the participant id used for later exports
    Set { id: String },
    /// Print the stored participant id
    Show,
    /// Forget the stored participant id
    Clear,
}

#[derive(Clone, Copy, ValueEnum)]
enum GatingArg {
    OnChange,
    AfterHover,
}

impl From<GatingArg> for ValueGating {
    fn from(arg: GatingArg) -> Self {
        match arg {
            GatingArg::OnChange => ValueGating::OnChange,
            GatingArg::AfterHover => ValueGating::AfterHover,
        }
    }
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|e| {
        warn!("Could not load configuration, using defaults: {e}");
        Config::default()
    });

    match cli.command {
        Commands::Participant { action } => cmd_participant(&config, action),
        Commands::Replay {
            file,
            output,
            no_time_string,
            gating,
        } => cmd_replay(&config, file, output, no_time_string, gating),
        Commands::Inspect { file } => cmd_inspect(file),
        Commands::Status => cmd_status(&config),
        Commands::Privacy => {
            println!("{DATA_DECLARATION}");
            Ok(())
        }
        Commands::Config { write } => cmd_config(&config, write),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_participant(config: &Config, action: ParticipantCommand) -> Result<()> {
    let mut store = FileParticipantStore::new(config.participant_store_path());

    match action {
        ParticipantCommand::Set { id } => {
            let id = id.trim();
            if id.is_empty() {
                return Err(anyhow!("participant id must not be empty"));
            }
            store
                .set_participant(&ParticipantId::new(id))
                .context("saving participant id")?;
            println!("Participant id set to {id}");
        }
        ParticipantCommand::Show => match store.participant().context("reading participant id")? {
            Some(id) => println!("{id}"),
            None => println!("No participant id stored."),
        },
        ParticipantCommand::Clear => {
            store
                .clear_participant()
                .context("clearing participant id")?;
            println!("Participant id cleared.");
        }
    }
    Ok(())
}

fn cmd_replay(
    config: &Config,
    file: PathBuf,
    output: Option<PathBuf>,
    no_time_string: bool,
    gating: Option<GatingArg>,
) -> Result<()> {
    let layout = CsvLayout {
        time_string: config.layout.time_string && !no_time_string,
    };
    let mut options = config.recorder.clone();
    if let Some(gating) = gating {
        options.value_gating = gating.into();
    }
    let recorder = Recorder::new(options);

    if let Err(e) = config.ensure_directories() {
        warn!("Could not create data directories: {e}");
    }

    let delivery = DirectoryDelivery::new(output.unwrap_or_else(|| config.export_path.clone()));
    let mut store = FileParticipantStore::new(config.participant_store_path());
    let transparency = create_shared_log_with_persistence(config.transparency_path());

    let input = File::open(&file).with_context(|| format!("opening {file:?}"))?;

    // Feed notifications from a reader thread; the page loop below is the only writer.
    let channel = NotificationChannel::new(config.channel_capacity);
    let sender = channel.sender();
    let receiver = channel.into_receiver();
    let feeder = thread::spawn(move || -> std::io::Result<usize> {
        let mut fed = 0;
        for (i, line) in BufReader::new(input).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Notification>(&line) {
                Ok(notification) => {
                    if sender.notify_blocking(notification).is_err() {
                        break;
                    }
                    fed += 1;
                }
                Err(e) => warn!("Skipping line {}: {e}", i + 1),
            }
        }
        Ok(fed)
    });

    let new_page = |store: &FileParticipantStore| {
        PageSession::new(recorder.clone(), layout, load_participant(store))
            .with_transparency(transparency.clone())
    };

    let mut page = new_page(&store);
    let mut pages = 1;
    let mut exports = 0;

    for notification in receiver.iter() {
        match page.handle(notification) {
            PageAction::None => {}
            PageAction::Export(export) => {
                delivery.deliver(&export);
                exports += 1;
            }
            PageAction::Navigate(export) => {
                if let Some(export) = export {
                    delivery.deliver(&export);
                    exports += 1;
                }
                page = new_page(&store);
                pages += 1;
                debug!("Page {pages} started");
            }
            PageAction::StoreParticipant(id) => {
                if let Err(e) = store.set_participant(&id) {
                    warn!("Could not store participant id: {e}");
                }
            }
        }
    }

    let fed = feeder
        .join()
        .map_err(|_| anyhow!("notification reader panicked"))?
        .with_context(|| format!("reading {file:?}"))?;

    // Stream ended mid-page
    if page.has_pending() {
        if let Some(export) = page.export() {
            delivery.deliver(&export);
            exports += 1;
        }
    }

    if let Err(e) = transparency.save() {
        warn!("Could not save transparency log: {e}");
    }

    println!("Replayed {fed} notifications across {pages} page(s)");
    println!("Wrote {exports} export(s) to {:?}", delivery.dir());
    println!();
    println!("{}", transparency.summary());
    Ok(())
}

fn cmd_inspect(file: PathBuf) -> Result<()> {
    let text = std::fs::read_to_string(&file).with_context(|| format!("reading {file:?}"))?;
    let rows = parse_csv(&text).with_context(|| format!("parsing {file:?}"))?;

    println!("{} rows in {:?}", rows.len(), file);
    let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
        return Ok(());
    };
    println!(
        "Span: {} .. {} ({} ms)",
        first.timestamp,
        last.timestamp,
        last.timestamp - first.timestamp
    );
    println!();

    let mut per_control: BTreeMap<(String, String), BTreeMap<&'static str, usize>> =
        BTreeMap::new();
    for row in &rows {
        let counts = per_control
            .entry((
                row.question_id.to_string(),
                row.control_id.to_string(),
            ))
            .or_default();
        *counts.entry(row.event_type.as_str()).or_default() += 1;
    }

    for ((question, control), counts) in &per_control {
        let summary: Vec<String> = [
            EventType::Value,
            EventType::Enter,
            EventType::Leave,
            EventType::Select,
        ]
        .iter()
        .filter_map(|t| counts.get(&t.as_str()).map(|n| format!("{t}={n}")))
        .collect();
        println!("  {question}~{control}: {}", summary.join(", "));
    }
    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    println!("Survey Interaction Recorder Status");
    println!("==================================");
    println!();

    let store = FileParticipantStore::new(config.participant_store_path());
    match load_participant(&store) {
        Some(id) => println!("Participant id: {id}"),
        None => println!("Participant id: (not set)"),
    }
    println!("Export directory: {:?}", config.export_path);
    println!();

    let counts = read_counts(&config.transparency_path()).context("reading transparency stats")?;
    match counts.last_updated {
        Some(updated) => {
            println!("Last replay: {}", updated.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("Events recorded: {}", counts.recorded_events());
            println!("Question exports: {}", counts.question_exports());
            println!();
            println!("{}", counts.summary());
        }
        None => println!("No previous session data found."),
    }
    Ok(())
}

fn cmd_config(config: &Config, write: bool) -> Result<()> {
    if write {
        config.save().context("saving configuration")?;
        println!("Configuration written to {:?}", Config::config_path());
        return Ok(());
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
