// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Varint codec for the scalar values kept in the metadata datastore.

use unsigned_varint::{decode, encode};

use crate::blocks::ChainEpoch;
use crate::{Error, Result};

pub fn epoch_to_bytes(epoch: ChainEpoch) -> Vec<u8> {
    u64_to_bytes(epoch as u64)
}

pub fn bytes_to_epoch(buf: &[u8]) -> Result<ChainEpoch> {
    bytes_to_u64(buf).map(|v| v as ChainEpoch)
}

pub fn i64_to_bytes(value: i64) -> Vec<u8> {
    u64_to_bytes(value as u64)
}

pub fn bytes_to_i64(buf: &[u8]) -> Result<i64> {
    bytes_to_u64(buf).map(|v| v as i64)
}

pub fn u64_to_bytes(value: u64) -> Vec<u8> {
    let mut buf = encode::u64_buffer();
    encode::u64(value, &mut buf).to_vec()
}

pub fn bytes_to_u64(buf: &[u8]) -> Result<u64> {
    let (value, _) = decode::u64(buf).map_err(|e| Error::Metadata(e.to_string()))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn u64_round_trip(value: u64) -> bool {
        bytes_to_u64(&u64_to_bytes(value)).unwrap() == value
    }

    #[quickcheck]
    fn epoch_round_trip(epoch: i64) -> bool {
        let epoch = epoch.max(0);
        bytes_to_epoch(&epoch_to_bytes(epoch)).unwrap() == epoch
    }

    #[quickcheck]
    fn i64_round_trip(value: i64) -> bool {
        bytes_to_i64(&i64_to_bytes(value)).unwrap() == value
    }

    #[test]
    fn encoded_length() {
        // a u64 varint takes at most 10 bytes
        assert!(u64_to_bytes(u64::MAX).len() <= 10);
        assert_eq!(u64_to_bytes(0).len(), 1);
    }

    #[test]
    fn empty_buffer_is_an_error() {
        assert!(bytes_to_u64(&[]).is_err());
    }

    #[test]
    fn truncated_buffer_is_an_error() {
        let mut bytes = u64_to_bytes(u64::MAX);
        bytes.pop();
        assert!(bytes_to_u64(&bytes).is_err());
    }
}
