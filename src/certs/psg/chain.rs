// Copyright (C) Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0

//! Assembling and verifying chains of PSG entries.

use super::{
    entry::{peek_magic, CertificateEntry, LeafEntry, RootEntry},
    key::CurveType,
    Actor, LEAF_ENTRY_MAGIC,
};
use crate::certs::Verifiable;
use crate::error::{Error, Result};
use log::debug;
use openssl::{ec, ecdsa, pkey, sha};
use serde::{Deserialize, Serialize};

const MIN_CHAIN_LENGTH: usize = 2;
const MAX_CHAIN_LENGTH: usize = 3;

/// The role a chain member was discovered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Leaf,
    Root,
}

/// A chain member: a parsed entry wrapped with its discovered role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub kind: EntryKind,
    pub entry: CertificateEntry,
}

impl ChainEntry {
    /// The entry re-encoded in the host (service) byte order.
    pub fn to_service_bytes(&self) -> Result<Vec<u8>> {
        self.entry.to_bytes(Actor::Service)
    }
}

/// Splits a concatenated device blob into typed entries.
///
/// The device emits entries back to back in firmware byte order. The
/// assembler peeks a little-endian magic and length at the cursor and
/// slices off one entry at a time. An unrecognized magic ends assembly
/// without error; callers must check the resulting chain's size and
/// content to detect truncation.
pub struct ChainAssembler;

impl ChainAssembler {
    pub fn assemble(blob: &[u8]) -> Result<Vec<ChainEntry>> {
        let mut entries = Vec::new();
        let mut cursor = &blob[..];

        while cursor.len() >= 8 {
            let magic = peek_magic(cursor, Actor::Firmware)?;
            let length = u32::from_le_bytes(
                cursor[4..8]
                    .try_into()
                    .map_err(|_| Error::StructureParse("length field unreadable".into()))?,
            ) as usize;

            let kind = match magic {
                LEAF_ENTRY_MAGIC => EntryKind::Leaf,
                m if super::is_root_magic(m) => EntryKind::Root,
                m => {
                    debug!(
                        "assembly stopped at unknown magic {m:#010x}, {} bytes unconsumed",
                        cursor.len()
                    );
                    break;
                }
            };

            let slice = cursor.get(..length).ok_or_else(|| {
                Error::StructureParse(format!(
                    "entry declares {length} bytes, only {} remain",
                    cursor.len()
                ))
            })?;
            let entry = CertificateEntry::parse(slice, Actor::Firmware)?;
            entries.push(ChainEntry { kind, entry });
            cursor = &cursor[length..];
        }

        if !cursor.is_empty() {
            debug!("{} bytes left after chain assembly", cursor.len());
        }
        Ok(entries)
    }
}

/// An ordered chain of PSG entries, parent before child.
///
/// Invariant: length 2–3 with exactly one root member, enforced on
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsgChain {
    entries: Vec<ChainEntry>,
}

impl TryFrom<Vec<ChainEntry>> for PsgChain {
    type Error = Error;

    fn try_from(entries: Vec<ChainEntry>) -> Result<Self> {
        let roots = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Root)
            .count();
        if entries.len() < MIN_CHAIN_LENGTH || entries.len() > MAX_CHAIN_LENGTH || roots != 1 {
            return Err(Error::ChainValidation {
                rule: "chain shape",
                detail: format!("{} entries, {roots} roots", entries.len()),
            });
        }
        Ok(Self { entries })
    }
}

impl PsgChain {
    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    /// The single root member.
    pub fn root(&self) -> Result<&RootEntry> {
        self.entries
            .iter()
            .find_map(|e| match &e.entry {
                CertificateEntry::Root(root) if e.kind == EntryKind::Root => Some(root),
                _ => None,
            })
            .ok_or(Error::ChainValidation {
                rule: "chain shape",
                detail: "no root entry".into(),
            })
    }

    /// The last leaf member, which certifies the device key.
    pub fn leaf(&self) -> Result<&LeafEntry> {
        self.entries
            .iter()
            .rev()
            .find_map(|e| match &e.entry {
                CertificateEntry::Leaf(leaf) if e.kind == EntryKind::Leaf => Some(leaf),
                _ => None,
            })
            .ok_or(Error::ChainValidation {
                rule: "chain shape",
                detail: "no leaf entry".into(),
            })
    }

    /// Walks the chain once, verifying each member's signature under
    /// its predecessor's embedded public key.
    ///
    /// Returns `Ok(false)` when a signature does not verify or a
    /// member lacks a required capability (public key or signature);
    /// an `Err` means verification itself could not be performed.
    pub fn verify_chain_of_trust(&self) -> Result<bool> {
        for pair in self.entries.windows(2) {
            if !sig_verify(&pair[0].entry, &pair[1].entry)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Matches the chain's root against a trusted root fingerprint:
    /// SHA-256 over the root public key's X ‖ Y.
    pub fn verify_root(&self, trusted_fingerprint: &[u8; 32]) -> Result<()> {
        let root = self.root()?;
        let fingerprint = root.pub_key.as_ecc()?.fingerprint();
        if &fingerprint != trusted_fingerprint {
            return Err(Error::ChainValidation {
                rule: "trusted root",
                detail: hex::encode(fingerprint),
            });
        }
        Ok(())
    }
}

impl<'a> Verifiable for &'a PsgChain {
    type Output = &'a LeafEntry;

    fn verify(self) -> Result<Self::Output> {
        if !self.verify_chain_of_trust()? {
            return Err(Error::InvalidSignature);
        }
        self.leaf()
    }
}

impl Verifiable for (&CertificateEntry, &CertificateEntry) {
    type Output = ();

    /// Verifies that the child (second) entry's signature validates
    /// under the parent (first) entry's public key.
    fn verify(self) -> Result<()> {
        if sig_verify(self.0, self.1)? {
            Ok(())
        } else {
            Err(Error::InvalidSignature)
        }
    }
}

/// One step of the chain of trust.
///
/// The digest width follows the certified key's curve: 256-bit
/// coordinates use SHA-256, 384-bit coordinates SHA-384.
fn sig_verify(parent: &CertificateEntry, child: &CertificateEntry) -> Result<bool> {
    let (parent_key, child_pub, signature) = match (
        parent.pub_key().map(|k| k.as_ecc()),
        child.pub_key(),
        child.signature(),
    ) {
        (Some(Ok(pk)), Some(cp), Some(sig)) => (pk, cp, sig),
        _ => return Ok(false),
    };
    let child_key = match child_pub.as_ecc() {
        Ok(key) => key,
        Err(_) => return Ok(false),
    };

    let key = ec::EcKey::<pkey::Public>::try_from(parent_key)?;
    let payload = child_pub.to_bytes(Actor::Firmware)?;

    let digest = match child_key.curve {
        CurveType::Secp256r1 => sha::sha256(&payload).to_vec(),
        CurveType::Secp384r1 => sha::sha384(&payload).to_vec(),
    };

    let sig = ecdsa::EcdsaSig::try_from(signature)?;
    sig.verify(&digest, &key).map_err(|_| Error::InvalidSignature)
}
