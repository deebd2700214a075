mod core;
mod limited;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use core::{EvmLedgerGateway, DEFAULT_REQUEST_TIMEOUT};
pub use limited::LimitedGateway;

pub use crate::apis::gateway::{future_block, GatewayError, LedgerGateway};
