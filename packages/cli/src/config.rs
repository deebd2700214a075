use std::time::Duration;

use alloy_primitives::Address;
use anyhow::{Context, Result};
use elreader::{aggregator::DEFAULT_MAX_IN_FLIGHT, gateway::DEFAULT_REQUEST_TIMEOUT, AggregatorConfig};
use serde::{Deserialize, Serialize};
use utils::{config::ConfigExt, evm_client::EvmEndpoint};

/// The fully parsed and validated config struct we use in the application
/// this is built up from the ConfigBuilder which can load from multiple sources (in order of preference):
///
/// 1. cli args
/// 2. environment variables
/// 3. config file
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// The log-level to use, in the format of [tracing directives](https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html#directives).
    /// Default is `["info"]`
    pub log_level: Vec<String>,
    /// The node to read from
    /// Default is `http://localhost:8545`
    pub evm_endpoint: String,
    /// Address of the AllocationManager contract, required for every read
    pub allocation_manager: Option<Address>,
    /// Default is `16`
    pub max_in_flight: usize,
    /// Default is `10`
    pub request_timeout_secs: u64,
    /// No deadline by default, an aggregation runs until it finishes or is killed
    pub deadline_secs: Option<u64>,
    pub jaeger: Option<String>,
    pub prometheus: Option<String>,
}

/// Default values for the config struct
/// these are only used to fill in holes after all the parsing and loading is done
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: vec!["info".to_string()],
            evm_endpoint: "http://localhost:8545".to_string(),
            allocation_manager: None,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            deadline_secs: None,
            jaeger: None,
            prometheus: None,
        }
    }
}

impl ConfigExt for Config {
    const DIRNAME: &'static str = "elreader";
    const FILENAME: &'static str = "elreader.toml";

    fn log_levels(&self) -> impl Iterator<Item = &str> {
        self.log_level.iter().map(|s| s.as_str())
    }
}

impl Config {
    pub fn endpoint(&self) -> Result<EvmEndpoint> {
        self.evm_endpoint
            .parse()
            .with_context(|| format!("invalid evm endpoint {}", self.evm_endpoint))
    }

    pub fn allocation_manager(&self) -> Result<Address> {
        self.allocation_manager.context(
            "allocation manager address not set (--allocation-manager or ELREADER_ALLOCATION_MANAGER)",
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            max_in_flight: self.max_in_flight,
        }
    }
}
