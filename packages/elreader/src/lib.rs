#![allow(clippy::uninlined_format_args)]

pub mod aggregator; // builds slashable stake snapshots across operator sets
pub mod apis;
pub mod bindings;
pub mod error;
pub mod fetcher;
pub mod gateway; // where ledger reads actually happen
pub mod reader;
pub mod resolver;

pub use aggregator::{AggregatorConfig, SlashableStakeAggregator};
pub use error::{AggregationError, PipelineStage, ReaderError};
pub use fetcher::SlashableStakeFetcher;
pub use gateway::{EvmLedgerGateway, GatewayError, LedgerGateway, LimitedGateway};
pub use reader::OperatorSetReader;
pub use resolver::OperatorSetResolver;
