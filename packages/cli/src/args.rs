use alloy_primitives::Address;
use clap::{Args, Parser, Subcommand};
use elreader_types::{BlockHeight, OperatorSetKey};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utils::{config::CliEnvExt, serde::deserialize_vec_string};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[clap(flatten)]
    pub args: CliArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// This struct is used for both args and environment variables
/// the basic idea is that every env var can be overriden by a cli arg
/// and these override the config file
/// env vars follow the pattern of ELREADER_{UPPERCASE_ARG_NAME}
#[derive(Debug, Args, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CliArgs {
    /// The home directory of the application, where the elreader.toml configuration file is stored
    /// if not provided here or in an env var, a series of default directories will be tried
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<PathBuf>,

    /// The path to an optional dotenv file to try and load
    /// if not set, will be the current working directory's .env
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dotenv: Option<PathBuf>,

    /// Log level in the format of comma-separated tracing directives.
    #[arg(long, global = true, value_delimiter = ',')]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(deserialize_with = "deserialize_vec_string")]
    pub log_level: Vec<String>,

    /// The node to read from, http(s) or ws(s)
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evm_endpoint: Option<String>,

    /// Address of the AllocationManager contract
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocation_manager: Option<Address>,

    /// Upper bound on concurrent ledger requests during an aggregation
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_in_flight: Option<usize>,

    /// Per-request timeout, in seconds
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    /// Give up on an aggregation after this many seconds
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,

    /// OTLP collector for traces
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jaeger: Option<String>,

    /// OTLP collector for metrics
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prometheus: Option<String>,
}

impl CliEnvExt for CliArgs {
    const ENV_VAR_PREFIX: &'static str = "ELREADER";
    const TOML_IDENTIFIER: &'static str = "cli";

    fn home_dir(&self) -> Option<PathBuf> {
        self.home.clone()
    }

    fn dotenv_path(&self) -> Option<PathBuf> {
        self.dotenv.clone()
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Minimum slashable stake of every member of each operator set, per strategy
    SlashableStake {
        /// Operator sets as `avs:id`, repeatable
        #[clap(long = "operator-set", required = true, num_args = 1..)]
        operator_sets: Vec<OperatorSetKey>,

        /// Block to read at, the latest block if not set
        #[clap(long)]
        height: Option<BlockHeight>,
    },
    /// Operator sets the operator has allocated magnitude to
    AllocatedSets {
        #[clap(long)]
        operator: Address,

        #[clap(long)]
        height: Option<BlockHeight>,
    },
    /// Operator sets the operator is registered with
    RegisteredSets {
        #[clap(long)]
        operator: Address,

        #[clap(long)]
        height: Option<BlockHeight>,
    },
    IsRegistered {
        #[clap(long)]
        operator: Address,

        #[clap(long)]
        operator_set: OperatorSetKey,

        #[clap(long)]
        height: Option<BlockHeight>,
    },
    /// Allocations of one strategy across the operator's sets
    AllocationInfo {
        #[clap(long)]
        operator: Address,

        #[clap(long)]
        strategy: Address,

        #[clap(long)]
        height: Option<BlockHeight>,
    },
    AllocationDelay {
        #[clap(long)]
        operator: Address,

        #[clap(long)]
        height: Option<BlockHeight>,
    },
    /// Number of operators registered in the set
    MemberCount {
        #[clap(long)]
        operator_set: OperatorSetKey,

        #[clap(long)]
        height: Option<BlockHeight>,
    },
}
