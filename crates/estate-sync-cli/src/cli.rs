use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use estate_sync_core::events::Topic;
use estate_sync_core::models::{OrgTarget, RecordKind, RecordStatus};

#[derive(Parser)]
#[command(name = "estate-sync")]
#[command(about = "Scoped record sync for plantation field devices")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional JSON service config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Acting actor id (falls back to ESTATE_SYNC_ACTOR)
    #[arg(long, global = true, value_name = "ID")]
    pub actor: Option<String>,

    /// Acting role, legacy names accepted (falls back to ESTATE_SYNC_ROLE)
    #[arg(long, global = true, value_name = "ROLE")]
    pub role: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import organization tree, actors and assignments from a JSON fixture
    Import {
        /// Fixture file
        path: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the caller's resolved access scope
    Scope {
        #[command(flatten)]
        target: TargetArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Submit a sync batch (JSON file, stdin when omitted)
    Sync {
        /// Batch file
        path: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Submit newline-delimited batches and print the live events they raise
    Ingest {
        /// NDJSON file, one batch per line (stdin when omitted)
        path: Option<PathBuf>,
        /// Topics to follow (every topic when omitted)
        #[arg(long = "topic", value_enum)]
        topics: Vec<TopicArg>,
        /// Also follow sync status of these devices
        #[arg(long = "device", value_name = "ID")]
        devices: Vec<String>,
    },
    /// List records visible to the caller
    #[command(alias = "ls")]
    Records {
        #[command(flatten)]
        target: TargetArgs,
        /// Filter by record kind
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        /// Filter by review status
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        /// Filter by submitting device
        #[arg(long, value_name = "ID")]
        device: Option<String>,
        /// Only the caller's records changed after this Unix ms timestamp, oldest first
        #[arg(long, value_name = "MS", conflicts_with_all = ["kind", "status", "device"])]
        since: Option<i64>,
        /// Resume after this record id within the `--since` millisecond
        #[arg(long, value_name = "ID", requires = "since")]
        after_id: Option<String>,
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Records to skip
        #[arg(long, default_value = "0")]
        offset: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Approve or reject a pending harvest record
    Review {
        /// Record id
        id: String,
        /// Approve the record
        #[arg(long, conflicts_with = "reject")]
        approve: bool,
        /// Reject the record with a reason
        #[arg(long, value_name = "REASON")]
        reject: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show sync status of a device
    Status {
        /// Device id
        device: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List vehicles inside past the overstay threshold
    Overstays {
        /// Keep checking every SECS seconds, printing new alerts as JSON lines
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
        /// Output as JSON
        #[arg(long, conflicts_with = "watch")]
        json: bool,
    },
    /// List the caller's notifications
    Notifications {
        /// Number of notifications to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

/// Narrow a command to one organization node
#[derive(Args, Clone, Debug, Default)]
#[group(multiple = false)]
pub struct TargetArgs {
    /// Narrow to a company
    #[arg(long, value_name = "ID")]
    pub company: Option<String>,
    /// Narrow to an estate
    #[arg(long, value_name = "ID")]
    pub estate: Option<String>,
    /// Narrow to a division
    #[arg(long, value_name = "ID")]
    pub division: Option<String>,
}

impl TargetArgs {
    pub fn into_target(self) -> Option<OrgTarget> {
        self.company
            .map(OrgTarget::Company)
            .or_else(|| self.estate.map(OrgTarget::Estate))
            .or_else(|| self.division.map(OrgTarget::Division))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KindArg {
    Harvest,
    GuestLog,
}

impl From<KindArg> for RecordKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Harvest => Self::Harvest,
            KindArg::GuestLog => Self::GuestLog,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatusArg {
    Pending,
    Approved,
    Rejected,
}

impl From<StatusArg> for RecordStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Pending => Self::Pending,
            StatusArg::Approved => Self::Approved,
            StatusArg::Rejected => Self::Rejected,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum TopicArg {
    HarvestCreated,
    HarvestApproved,
    HarvestRejected,
    VehicleEntry,
    VehicleExit,
    VehicleOverstay,
}

impl TopicArg {
    pub const ALL: &[Self] = &[
        Self::HarvestCreated,
        Self::HarvestApproved,
        Self::HarvestRejected,
        Self::VehicleEntry,
        Self::VehicleExit,
        Self::VehicleOverstay,
    ];
}

impl From<TopicArg> for Topic {
    fn from(topic: TopicArg) -> Self {
        match topic {
            TopicArg::HarvestCreated => Self::HarvestCreated,
            TopicArg::HarvestApproved => Self::HarvestApproved,
            TopicArg::HarvestRejected => Self::HarvestRejected,
            TopicArg::VehicleEntry => Self::VehicleEntry,
            TopicArg::VehicleExit => Self::VehicleExit,
            TopicArg::VehicleOverstay => Self::VehicleOverstay,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
