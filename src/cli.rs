use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "trial-dqi",
    version,
    about = "Clean-status and data quality index computation for multi-site clinical trials"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import a JSON trial extract into the fact store.
    Load(LoadArgs),
    /// Inspect or edit the DQI weight registry.
    Weights(WeightsArgs),
    /// Recompute clean status and DQI scores for one study or all studies.
    Recompute(RecomputeArgs),
    Status(StatusArgs),
    /// Query computed records.
    Report(ReportArgs),
    /// Record, verify or list entries of the hash-chained audit log.
    Audit(AuditArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    #[arg(long, default_value = ".cache/trial-dqi")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

impl StoreArgs {
    pub fn resolve_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.cache_root.join("trial_dqi.sqlite"))
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.cache_root.join("manifests")
    }
}

#[derive(Args, Debug, Clone)]
pub struct LoadArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// JSON extract with studies, sites, subjects and per-subject facts.
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct WeightsArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(subcommand)]
    pub command: WeightsCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum WeightsCommand {
    /// Upsert the nine default weights as active entries.
    Init,
    /// Print effective weights, their source and the unnormalized sum.
    Show(ShowWeightsArgs),
    /// Change one metric's weight and/or active flag.
    Set(SetWeightArgs),
    /// Upsert entries from a JSON list of {metric_name, weight, is_active, description}.
    Import(ImportWeightsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ShowWeightsArgs {
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SetWeightArgs {
    #[arg(long)]
    pub metric: String,

    #[arg(long)]
    pub weight: Option<f64>,

    #[arg(long, conflicts_with = "inactive")]
    pub active: bool,

    #[arg(long)]
    pub inactive: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ImportWeightsArgs {
    #[arg(long)]
    pub input: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct RecomputeArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Limit the pass to one study; all studies when omitted.
    #[arg(long)]
    pub study_id: Option<String>,

    /// Push a study snapshot into the audit chain after each committed study.
    #[arg(long, default_value_t = false)]
    pub record_audit: bool,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, default_value_t = false, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: ReportCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ReportCommand {
    Study {
        #[arg(long)]
        study_id: String,
    },
    Sites {
        #[arg(long)]
        study_id: String,
    },
    AtRisk {
        #[arg(long)]
        study_id: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    Subject {
        #[arg(long)]
        subject_id: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct AuditArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(subcommand)]
    pub command: AuditCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AuditCommand {
    /// Record the current study score snapshot as a DQI_COMPUTED block.
    Record {
        #[arg(long)]
        study_id: String,
    },
    Verify {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    History {
        #[arg(long, default_value = "Study")]
        entity_type: String,

        #[arg(long)]
        entity_id: String,
    },
}
