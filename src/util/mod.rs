// Copyright (C) Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! Helpful primitives for developing the crate.

use crate::error::{Error, Result};

/// Reverses the bytes of every 4-byte word in place.
///
/// The device firmware stores multi-word byte strings (curve points,
/// signature components, hash words) with each 32-bit word in its own
/// little-endian order; applying the swap twice restores the input.
pub(crate) fn swap_u32_words(buf: &mut [u8]) {
    debug_assert!(buf.len() % 4 == 0);
    for word in buf.chunks_exact_mut(4) {
        word.reverse();
    }
}

pub(crate) trait AsBeBytes {
    /// The value as a fixed-width big-endian byte string, left-padded
    /// with zeros.
    fn as_be_bytes(&self, width: usize) -> Result<Vec<u8>>;
}

impl AsBeBytes for openssl::bn::BigNumRef {
    fn as_be_bytes(&self, width: usize) -> Result<Vec<u8>> {
        let raw = self.to_vec();
        if raw.len() > width {
            return Err(Error::StructureParse(format!(
                "integer of {} bytes exceeds field width {width}",
                raw.len()
            )));
        }

        let mut buf = vec![0u8; width];
        buf[width - raw.len()..].copy_from_slice(&raw);
        Ok(buf)
    }
}
