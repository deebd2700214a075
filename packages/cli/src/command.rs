use std::future::Future;

use anyhow::Result;
use elreader::{LedgerGateway, OperatorSetReader};
use serde_json::{json, Value};
use tracing::instrument;

use crate::args::Command;

/// Runs one subcommand against the reader, returning what gets printed.
/// Only an aggregation is long enough to be worth cancelling, the other reads ignore `cancel`.
#[instrument(skip(reader, cancel), fields(subsys = "Cli"))]
pub async fn run<G: LedgerGateway>(
    reader: &OperatorSetReader<G>,
    command: Command,
    cancel: impl Future<Output = ()>,
) -> Result<Value> {
    let output = match command {
        Command::SlashableStake {
            operator_sets,
            height,
        } => {
            let result = match height {
                Some(height) => {
                    reader
                        .aggregator()
                        .aggregate_with_cancel(&operator_sets, height, cancel)
                        .await?
                }
                None => {
                    reader
                        .aggregate_latest_with_cancel(&operator_sets, cancel)
                        .await?
                }
            };
            serde_json::to_value(result)?
        }
        Command::AllocatedSets { operator, height } => {
            serde_json::to_value(reader.allocated_sets(operator, height).await?)?
        }
        Command::RegisteredSets { operator, height } => {
            serde_json::to_value(reader.registered_sets(operator, height).await?)?
        }
        Command::IsRegistered {
            operator,
            operator_set,
            height,
        } => {
            let registered = reader
                .is_registered_with_operator_set(operator, operator_set, height)
                .await?;
            json!({
                "operator": operator,
                "operator_set": operator_set,
                "registered": registered,
            })
        }
        Command::AllocationInfo {
            operator,
            strategy,
            height,
        } => serde_json::to_value(reader.allocation_info(operator, strategy, height).await?)?,
        Command::AllocationDelay { operator, height } => {
            let delay = reader.allocation_delay(operator, height).await?;
            json!({
                "operator": operator,
                "delay": delay,
            })
        }
        Command::MemberCount {
            operator_set,
            height,
        } => {
            let count = reader.member_count(operator_set, height).await?;
            json!({
                "operator_set": operator_set,
                "member_count": count,
            })
        }
    };

    Ok(output)
}
