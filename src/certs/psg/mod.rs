// Copyright (C) Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0

//! The proprietary ("PSG") fixed-layout certificate format.
//!
//! Older device generations return their provisioning chain as a
//! concatenation of binary entries instead of X.509 certificates. Every
//! structure exists in two on-wire byte orders, selected by the
//! [`Actor`] passed to its codec.

pub mod chain;
pub mod entry;
pub mod key;
pub mod sig;

pub use chain::{ChainAssembler, ChainEntry, EntryKind, PsgChain};
pub use entry::{
    AesKeyEntry, Block0Entry, CancellableBlock0Entry, CertificateEntry, KeyWrappingType,
    LeafEntry, RootEntry, RootHashType, StorageType,
};
pub use key::{CurveType, PsgEccKey, PsgPublicKey, MANIFEST_PUBKEY_MAGIC, PUBKEY_MAGIC};
pub use sig::PsgSignature;

use crate::error::Result;
use crate::util::swap_u32_words;
use std::io::{Read, Write};

/// Magic of a leaf certificate entry.
pub const LEAF_ENTRY_MAGIC: u32 = 0x9254_0917;

/// Magic of a single-root certificate entry.
pub const ROOT_ENTRY_MAGIC: u32 = 0x8925_9036;

/// Magic of a multi-root certificate entry.
pub const ROOT_MULTI_ENTRY_MAGIC: u32 = 0x8950_9436;

/// Magic of a block-0 entry.
pub const BLOCK0_ENTRY_MAGIC: u32 = 0x1536_4367;

/// Magic of a cancellable block-0 entry.
pub const CANCELLABLE_BLOCK0_MAGIC: u32 = 0x6549_5853;

/// Metadata magic embedded in a cancellable block-0 entry.
pub const CANCELLATION_METADATA_MAGIC: u32 = 0x7105_0792;

/// Magic of an AES key entry.
pub const AES_KEY_ENTRY_MAGIC: u32 = 0x25D0_4E7F;

/// Magic of the user AES certificate embedded in an AES key entry.
pub const USER_AES_CERT_MAGIC: u32 = 0xD085_0CAA;

/// Whether `magic` denotes a root entry, single or multi.
pub fn is_root_magic(magic: u32) -> bool {
    magic == ROOT_ENTRY_MAGIC || magic == ROOT_MULTI_ENTRY_MAGIC
}

/// The byte-order perspective under which a PSG structure is read or
/// written.
///
/// The host ("service") side exchanges structures with big-endian
/// fields; the device firmware uses little-endian fields and stores
/// multi-word byte strings with each 4-byte word swapped. Codec
/// operations always state which actor they target; nothing is
/// propagated implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// Host byte order: big-endian words, byte strings as-is.
    Service,
    /// Device byte order: little-endian words, byte strings swapped
    /// per 4-byte word.
    Firmware,
}

impl Actor {
    pub(crate) fn read_u32(self, reader: &mut impl Read) -> Result<u32> {
        let mut bytes = [0u8; 4];
        reader.read_exact(&mut bytes)?;
        Ok(match self {
            Actor::Service => u32::from_be_bytes(bytes),
            Actor::Firmware => u32::from_le_bytes(bytes),
        })
    }

    pub(crate) fn write_u32(self, writer: &mut impl Write, value: u32) -> Result<()> {
        let bytes = match self {
            Actor::Service => value.to_be_bytes(),
            Actor::Firmware => value.to_le_bytes(),
        };
        Ok(writer.write_all(&bytes)?)
    }

    /// Reads `len` bytes of a multi-word byte string, converting into
    /// the in-memory (service) order.
    pub(crate) fn read_words(self, reader: &mut impl Read, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        if self == Actor::Firmware {
            swap_u32_words(&mut buf);
        }
        Ok(buf)
    }

    /// Writes a multi-word byte string held in service order.
    pub(crate) fn write_words(self, writer: &mut impl Write, words: &[u8]) -> Result<()> {
        match self {
            Actor::Service => Ok(writer.write_all(words)?),
            Actor::Firmware => {
                let mut buf = words.to_vec();
                swap_u32_words(&mut buf);
                Ok(writer.write_all(&buf)?)
            }
        }
    }
}
