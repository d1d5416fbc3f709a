use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "stack")]
#[command(about = "Credit card wallet with cashback recommendations", long_about = None)]
pub struct Cli {
    /// Override Stack home directory (config/data subdirs will be created inside it).
    #[arg(long, env = "STACK_HOME")]
    pub home: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Card(CardArgs),
    Txn(TxnArgs),
    /// Which card earns the most on a charge.
    Best(BestArgs),
    /// Actual vs potential cashback over a time range.
    Rewards(RewardsArgs),
    Remote(RemoteArgs),
}

/// Categories offered when recording a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CategoryArg {
    Dining,
    Groceries,
    Travel,
    Shopping,
    Transportation,
    Streaming,
    Other,
}

impl CategoryArg {
    pub fn as_str(self) -> &'static str {
        match self {
            CategoryArg::Dining => "Dining",
            CategoryArg::Groceries => "Groceries",
            CategoryArg::Travel => "Travel",
            CategoryArg::Shopping => "Shopping",
            CategoryArg::Transportation => "Transportation",
            CategoryArg::Streaming => "Streaming",
            CategoryArg::Other => "Other",
        }
    }
}

#[derive(Debug, Args)]
pub struct CardArgs {
    #[command(subcommand)]
    pub cmd: CardCmd,
}

#[derive(Debug, Subcommand)]
pub enum CardCmd {
    Add(CardAddArgs),
    List,
    Show { card: String },
    Remove { card: String },
    /// Built-in cards with their reward rules.
    Templates,
}

#[derive(Debug, Args)]
pub struct CardAddArgs {
    pub name: String,

    /// Start from a built-in card (see `stack card templates`).
    #[arg(long)]
    pub template: Option<String>,

    /// Opening balance.
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub balance: String,

    /// Payment due date (YYYY-MM-DD). Defaults to 30 days from today.
    #[arg(long)]
    pub due: Option<String>,

    #[arg(long)]
    pub last_four: Option<String>,

    /// Reward rule as "Category=multiplier", e.g. "Dining=0.04". Repeatable.
    #[arg(long = "rule")]
    pub rules: Vec<String>,

    #[arg(long)]
    pub benefits: Option<String>,

    /// The card earns points rather than cash.
    #[arg(long)]
    pub points: bool,

    /// Cash value of one point.
    #[arg(long, requires = "points")]
    pub point_value: Option<String>,
}

#[derive(Debug, Args)]
pub struct TxnArgs {
    #[command(subcommand)]
    pub cmd: TxnCmd,
}

#[derive(Debug, Subcommand)]
pub enum TxnCmd {
    Add(TxnAddArgs),
    List {
        #[arg(long)]
        card: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    Delete {
        id: String,
    },
}

#[derive(Debug, Args)]
pub struct TxnAddArgs {
    /// Merchant name.
    pub name: String,

    /// Amount charged. Negative for refunds.
    #[arg(allow_hyphen_values = true)]
    pub amount: String,

    /// Card charged (name or id prefix).
    #[arg(long)]
    pub card: Option<String>,

    #[arg(long, value_enum, ignore_case = true, default_value_t = CategoryArg::Other)]
    pub category: CategoryArg,

    /// Date of the charge (YYYY-MM-DD or RFC3339). Defaults to now.
    #[arg(long)]
    pub date: Option<String>,
}

#[derive(Debug, Args)]
pub struct BestArgs {
    #[arg(value_enum, ignore_case = true)]
    pub category: CategoryArg,
    pub amount: String,
}

#[derive(Debug, Args)]
pub struct RewardsArgs {
    /// 1w, 1m, 3m, 1y or all. Defaults to the configured range.
    #[arg(long)]
    pub range: Option<String>,

    /// Also print the per-day series.
    #[arg(long)]
    pub series: bool,
}

#[derive(Debug, Args)]
pub struct RemoteArgs {
    #[command(subcommand)]
    pub cmd: RemoteCmd,
}

#[derive(Debug, Subcommand)]
pub enum RemoteCmd {
    /// Point Stack at a remote transaction service.
    SetUrl { url: String },
    List {
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Upload a local transaction.
    Push { id: String },
}
