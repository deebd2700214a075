use alloy_primitives::Address;
use rand::prelude::*;

pub fn rand_address_evm() -> Address {
    let bytes: [u8; 20] = rand::rng().random();
    Address::from(bytes)
}

/// `n` distinct random addresses, sorted so tests can compare against map key order
pub fn rand_addresses_evm(n: usize) -> Vec<Address> {
    let mut addresses = std::collections::BTreeSet::new();
    while addresses.len() < n {
        addresses.insert(rand_address_evm());
    }
    addresses.into_iter().collect()
}
