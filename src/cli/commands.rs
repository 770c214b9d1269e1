use clap::{Args, Parser, Subcommand};

use crate::model::item::ItemId;

#[derive(Parser)]
#[command(name = "tt", about = concat!("tiered v", env!("CARGO_PKG_VERSION"), " - a nested checklist you can reorder"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different project directory
    #[arg(short = 'C', long = "project-dir", global = true)]
    pub project_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new list in the current directory
    Init,
    /// Show the list
    List(ListArgs),
    /// Add an item
    Add(AddArgs),
    /// Mark an item complete
    Check(IdArg),
    /// Mark an item incomplete
    Uncheck(IdArg),
    /// Delete an item and everything under it
    Rm(IdArg),
    /// Expand or collapse an item
    Toggle(IdArg),
    /// Change an item's text
    Edit(EditArgs),
    /// Move an item within its sibling group
    Mv(MvArgs),
    /// Indent (+N) or outdent (-N) an item
    Tier(TierArgs),
    /// Replay a pointer drag on an item
    Drag(DragArgs),
    /// Validate stored items
    Verify,
    /// Show or set a config value
    Config(ConfigArgs),
    /// View or manage the recovery log
    Recovery(RecoveryCmd),
}

#[derive(Args)]
pub struct IdArg {
    pub id: ItemId,
}

#[derive(Args)]
pub struct ListArgs {
    /// Show children of collapsed items too
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct AddArgs {
    pub text: String,
    /// Add under this item (default: top level)
    #[arg(long, conflicts_with = "after")]
    pub parent: Option<ItemId>,
    /// Add directly after this item
    #[arg(long)]
    pub after: Option<ItemId>,
}

#[derive(Args)]
pub struct EditArgs {
    pub id: ItemId,
    pub text: String,
}

#[derive(Args)]
pub struct MvArgs {
    pub id: ItemId,
    /// Zero-based position among siblings
    pub position: usize,
}

#[derive(Args)]
pub struct TierArgs {
    pub id: ItemId,
    /// Tiers to move: positive nests deeper, negative moves out
    #[arg(allow_hyphen_values = true)]
    pub delta: i32,
}

#[derive(Args)]
pub struct DragArgs {
    pub id: ItemId,
    /// Horizontal travel in pixels
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub dx: f32,
    /// Vertical travel in pixels
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub dy: f32,
    /// Height of every row in the synthetic layout
    #[arg(long, default_value_t = 32.0)]
    pub row_height: f32,
    /// Pointer events to split the travel into
    #[arg(long, default_value_t = 4)]
    pub steps: u32,
    /// Resolve the drag but do not commit it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Key as section.name, e.g. list.auto_sort
    pub key: Option<String>,
    pub value: Option<String>,
}

// ---------------------------------------------------------------------------
// Recovery log
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct RecoveryCmd {
    #[command(subcommand)]
    pub action: Option<RecoveryAction>,
    /// Maximum number of entries to show (default: 10)
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Subcommand)]
pub enum RecoveryAction {
    /// Remove old entries
    Prune(RecoveryPruneArgs),
    /// Print the absolute path to the recovery log
    Path,
}

#[derive(Args)]
pub struct RecoveryPruneArgs {
    /// Remove entries older than this timestamp (default: 30 days ago)
    #[arg(long)]
    pub before: Option<String>,
    /// Remove all entries
    #[arg(long)]
    pub all: bool,
}
