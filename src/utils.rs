use std::time::{SystemTime, UNIX_EPOCH};

use alloy::hex;
use rand::{Rng, RngCore, rngs::OsRng};

use crate::error::Result;

pub fn random_bytes32() -> [u8; 32] {
    let mut random_value = [0u8; 32];
    OsRng.fill_bytes(&mut random_value);
    random_value
}

/// Random topic string, 32 bytes hex encoded
pub fn random_topic() -> String {
    hex::encode(random_bytes32())
}

/// Request ids must fit in an f64 without loss since the wallet side is
/// usually JavaScript. Maximum is 2^53 - 1, zero is reserved.
pub fn random_request_id() -> u64 {
    let id: u64 = rand::thread_rng().r#gen();
    id % 9007199254740990 + 1
}

pub fn unix_timestamp() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}
