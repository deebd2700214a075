use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvmClientError {
    #[error("Contract not deployed {0}")]
    ContractNotDeployed(alloy_primitives::Address),

    #[error("Could not get contract code at {0}: {1:?}")]
    FailedGetCode(alloy_primitives::Address, anyhow::Error),

    #[error("Unable to parse endpoint: {0}")]
    ParseEndpoint(String),

    #[error("Unable to create web socket provider: {0:#?}")]
    WebSocketProvider(anyhow::Error),
}
