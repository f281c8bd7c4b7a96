use std::path::{Path, PathBuf};

mod clear;
mod list;
mod seed;
mod show;
mod status;

use clap::ArgAction;
use clear::Clear;
use list::List;
use relief_store::{relief, DocId, Slot, Store};
use seed::Seed;
use show::Show;
use status::Status;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global=true)]
    verbose: u8,

    /// The path to the root of the relief data store
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        self.command
            .unwrap_or_else(|| Command::Status(Status::default()))
            .run(&self.root)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Show document counts per collection (default)
    Status(Status),

    /// List the documents of an indexed type
    List(List),

    /// Show one document with its references and referrers
    Show(Show),

    /// Replace the store's contents with sample data
    Seed(Seed),

    /// Delete every document of an indexed type
    Clear(Clear),
}

impl Command {
    fn run(self, root: &Path) -> anyhow::Result<()> {
        match self {
            Self::Status(command) => command.run(root)?,
            Self::List(command) => command.run(root)?,
            Self::Show(command) => command.run(root)?,
            Self::Seed(command) => command.run(root)?,
            Self::Clear(command) => command.run(root)?,
        }
        Ok(())
    }
}

/// Opens the store at `root` with every relief model registered.
fn open_store(root: &Path) -> anyhow::Result<Store> {
    Ok(Store::open(root, relief::registry()?))
}

/// A one-line rendering of a document: its identity, then every set value
/// and the size of every reference set.
fn summarize(store: &Store, id: DocId) -> anyhow::Result<String> {
    let record = store.record(id)?;
    let mut parts = vec![record.to_string()];
    for (field, slot) in record.schema().fields().iter().zip(record.slots()) {
        if field.is_identity() {
            continue;
        }
        match slot {
            Slot::Value(value) if value.is_null() => {}
            Slot::Value(value) => parts.push(format!("{}={value}", field.name())),
            Slot::References(set) => parts.push(format!("{}={}", field.name(), set.len())),
        }
    }
    Ok(parts.join("  "))
}
