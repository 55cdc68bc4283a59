// Copyright (C) Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0

//! PSG certificate entries.
//!
//! Entry layouts share a common shape: a header of 4-byte words
//! beginning with a format-specific magic, followed by the public-key
//! and/or signature sub-structures. The header length fields must be
//! internally consistent with the actual encoded sizes; decoding
//! validates both.

use super::{
    key::{PsgPublicKey, PUBKEY_METADATA_SIZE},
    sig::PsgSignature,
    Actor, AES_KEY_ENTRY_MAGIC, BLOCK0_ENTRY_MAGIC, CANCELLABLE_BLOCK0_MAGIC,
    CANCELLATION_METADATA_MAGIC, LEAF_ENTRY_MAGIC, ROOT_ENTRY_MAGIC, ROOT_MULTI_ENTRY_MAGIC,
    USER_AES_CERT_MAGIC,
};
use crate::error::{Error, Result};
use codicon::{Decoder, Encoder};
use openssl::sha;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Header size of leaf and block-0 entries: six 4-byte fields.
const ENTRY_BASIC_SIZE: usize = 24;

/// Header size of root and cancellable block-0 entries: eight 4-byte
/// fields.
const ENTRY_EXTENDED_SIZE: usize = 32;

/// What a root entry's hash is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RootHashType {
    Intel,
    Manufacturing,
}

impl TryFrom<u32> for RootHashType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(RootHashType::Intel),
            1 => Ok(RootHashType::Manufacturing),
            v => Err(Error::StructureParse(format!(
                "unknown root hash type {v}"
            ))),
        }
    }
}

/// A leaf certificate entry: a signed public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafEntry {
    /// The certified public key. Building an entry without one is an
    /// error.
    pub pub_key: Option<PsgPublicKey>,

    /// Signature over the firmware-order encoding of the public-key
    /// section, issued by the parent entry's key.
    pub signature: Option<PsgSignature>,
}

impl LeafEntry {
    pub fn new(pub_key: PsgPublicKey, signature: Option<PsgSignature>) -> Self {
        Self {
            pub_key: Some(pub_key),
            signature,
        }
    }

    pub fn total_size(&self) -> usize {
        ENTRY_BASIC_SIZE + self.data_length() + self.signature_length()
    }

    fn data_length(&self) -> usize {
        self.pub_key.as_ref().map_or(0, PsgPublicKey::total_size)
    }

    fn signature_length(&self) -> usize {
        self.signature.as_ref().map_or(0, PsgSignature::total_size)
    }

    /// The byte string the parent signs: the public-key section in
    /// firmware order.
    pub fn signed_payload(&self) -> Result<Vec<u8>> {
        self.pub_key
            .as_ref()
            .ok_or_else(|| Error::StructureParse("leaf entry has no public key".into()))?
            .to_bytes(Actor::Firmware)
    }
}

impl codicon::Decoder<Actor> for LeafEntry {
    type Error = Error;

    fn decode(mut reader: impl Read, actor: Actor) -> Result<Self> {
        let magic = actor.read_u32(&mut reader)?;
        if magic != LEAF_ENTRY_MAGIC {
            return Err(Error::bad_magic("leaf entry", LEAF_ENTRY_MAGIC, magic));
        }

        let length_offset = actor.read_u32(&mut reader)? as usize;
        let data_length = actor.read_u32(&mut reader)? as usize;
        let signature_length = actor.read_u32(&mut reader)? as usize;
        let _sha_length = actor.read_u32(&mut reader)?;
        let _reserved = actor.read_u32(&mut reader)?;

        let pub_key = PsgPublicKey::decode(&mut reader, actor)?;
        if data_length != pub_key.total_size() {
            return Err(Error::StructureParse(format!(
                "leaf data length {data_length} does not match public key size {}",
                pub_key.total_size()
            )));
        }

        let signature = if signature_length > 0 {
            let sig = PsgSignature::decode(&mut reader, actor)?;
            if signature_length != sig.total_size() {
                return Err(Error::StructureParse(format!(
                    "leaf signature length {signature_length} does not match signature size {}",
                    sig.total_size()
                )));
            }
            Some(sig)
        } else {
            None
        };

        if length_offset != ENTRY_BASIC_SIZE + data_length + signature_length {
            return Err(Error::StructureParse(format!(
                "leaf length offset {length_offset} inconsistent with entry content"
            )));
        }

        Ok(Self {
            pub_key: Some(pub_key),
            signature,
        })
    }
}

impl codicon::Encoder<Actor> for LeafEntry {
    type Error = Error;

    fn encode(&self, mut writer: impl Write, actor: Actor) -> Result<()> {
        let pub_key = self
            .pub_key
            .as_ref()
            .ok_or_else(|| Error::StructureParse("leaf entry has no public key".into()))?;

        actor.write_u32(&mut writer, LEAF_ENTRY_MAGIC)?;
        actor.write_u32(&mut writer, self.total_size() as u32)?;
        actor.write_u32(&mut writer, self.data_length() as u32)?;
        actor.write_u32(&mut writer, self.signature_length() as u32)?;
        actor.write_u32(&mut writer, 0)?; // sha length
        actor.write_u32(&mut writer, 0)?; // reserved

        pub_key.encode(&mut writer, actor)?;
        if let Some(sig) = &self.signature {
            sig.encode(&mut writer, actor)?;
        }
        Ok(())
    }
}

/// A root certificate entry: an unsigned trust anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootEntry {
    pub root_hash_type: RootHashType,
    /// First big-endian word of the curve-matched digest over the
    /// public key's X ‖ Y.
    pub hash_msb: u32,
    pub pub_key: PsgPublicKey,
    /// Whether the entry uses the multi-root magic.
    pub multi: bool,
}

impl RootEntry {
    pub fn new(root_hash_type: RootHashType, pub_key: PsgPublicKey) -> Result<Self> {
        let hash_msb = pub_key.as_ecc()?.hash_msb();
        Ok(Self {
            root_hash_type,
            hash_msb,
            pub_key,
            multi: false,
        })
    }

    /// Switches the entry to the multi-root magic.
    pub fn as_multi(mut self) -> Self {
        self.multi = true;
        self
    }

    pub fn magic(&self) -> u32 {
        if self.multi {
            ROOT_MULTI_ENTRY_MAGIC
        } else {
            ROOT_ENTRY_MAGIC
        }
    }

    pub fn total_size(&self) -> usize {
        ENTRY_EXTENDED_SIZE + self.pub_key.total_size()
    }

    /// Checks the stored hash word against the embedded public key.
    pub fn verify_hash_msb(&self) -> Result<()> {
        let expected = self.pub_key.as_ecc()?.hash_msb();
        if self.hash_msb != expected {
            return Err(Error::StructureParse(format!(
                "root hash MSB {:#010x} does not match public key digest {expected:#010x}",
                self.hash_msb
            )));
        }
        Ok(())
    }
}

impl codicon::Decoder<Actor> for RootEntry {
    type Error = Error;

    fn decode(mut reader: impl Read, actor: Actor) -> Result<Self> {
        let magic = actor.read_u32(&mut reader)?;
        if !super::is_root_magic(magic) {
            return Err(Error::bad_magic("root entry", ROOT_ENTRY_MAGIC, magic));
        }

        let length_offset = actor.read_u32(&mut reader)? as usize;
        let data_length = actor.read_u32(&mut reader)? as usize;
        let _signature_length = actor.read_u32(&mut reader)?;
        let _sha_length = actor.read_u32(&mut reader)?;
        let root_hash_type = RootHashType::try_from(actor.read_u32(&mut reader)?)?;
        let hash_msb = actor.read_u32(&mut reader)?;
        let _reserved = actor.read_u32(&mut reader)?;

        let pub_key = PsgPublicKey::decode(&mut reader, actor)?;
        if data_length != pub_key.total_size() {
            return Err(Error::StructureParse(format!(
                "root data length {data_length} does not match public key size {}",
                pub_key.total_size()
            )));
        }
        if length_offset != ENTRY_EXTENDED_SIZE + data_length {
            return Err(Error::StructureParse(format!(
                "root length offset {length_offset} inconsistent with entry content"
            )));
        }

        Ok(Self {
            root_hash_type,
            hash_msb,
            pub_key,
            multi: magic == ROOT_MULTI_ENTRY_MAGIC,
        })
    }
}

impl codicon::Encoder<Actor> for RootEntry {
    type Error = Error;

    fn encode(&self, mut writer: impl Write, actor: Actor) -> Result<()> {
        actor.write_u32(&mut writer, self.magic())?;
        actor.write_u32(&mut writer, self.total_size() as u32)?;
        actor.write_u32(&mut writer, self.pub_key.total_size() as u32)?;
        actor.write_u32(&mut writer, 0)?; // signature length
        actor.write_u32(&mut writer, 0)?; // sha length
        actor.write_u32(&mut writer, self.root_hash_type as u32)?;
        actor.write_u32(&mut writer, self.hash_msb)?;
        actor.write_u32(&mut writer, 0)?; // reserved

        self.pub_key.encode(&mut writer, actor)
    }
}

/// A block-0 entry: a detached signature over a protected payload's
/// SHA-384.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block0Entry {
    pub signature: PsgSignature,
}

impl Block0Entry {
    pub fn total_size(&self) -> usize {
        ENTRY_BASIC_SIZE + self.signature.total_size()
    }

    /// The byte string the signature covers for `payload`.
    pub fn signed_payload(payload: &[u8]) -> Vec<u8> {
        sha::sha384(payload).to_vec()
    }
}

impl codicon::Decoder<Actor> for Block0Entry {
    type Error = Error;

    fn decode(mut reader: impl Read, actor: Actor) -> Result<Self> {
        let magic = actor.read_u32(&mut reader)?;
        if magic != BLOCK0_ENTRY_MAGIC {
            return Err(Error::bad_magic("block-0 entry", BLOCK0_ENTRY_MAGIC, magic));
        }

        let _length_offset = actor.read_u32(&mut reader)?;
        let _data_length = actor.read_u32(&mut reader)?;
        let signature_length = actor.read_u32(&mut reader)? as usize;
        let _sha_length = actor.read_u32(&mut reader)?;
        let _reserved = actor.read_u32(&mut reader)?;

        let signature = PsgSignature::decode(&mut reader, actor)?;
        if signature_length != signature.total_size() {
            return Err(Error::StructureParse(format!(
                "block-0 signature length {signature_length} does not match signature size {}",
                signature.total_size()
            )));
        }

        Ok(Self { signature })
    }
}

impl codicon::Encoder<Actor> for Block0Entry {
    type Error = Error;

    fn encode(&self, mut writer: impl Write, actor: Actor) -> Result<()> {
        actor.write_u32(&mut writer, BLOCK0_ENTRY_MAGIC)?;
        actor.write_u32(&mut writer, self.total_size() as u32)?;
        actor.write_u32(&mut writer, 0)?; // data length
        actor.write_u32(&mut writer, self.signature.total_size() as u32)?;
        actor.write_u32(&mut writer, 0)?; // sha length
        actor.write_u32(&mut writer, 0)?; // reserved

        self.signature.encode(&mut writer, actor)
    }
}

/// A cancellable block-0 entry: like [`Block0Entry`] but revocable via
/// a cancellation id mixed into the signed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellableBlock0Entry {
    pub cancellation_id: u32,
    pub signature: PsgSignature,
}

impl CancellableBlock0Entry {
    pub fn total_size(&self) -> usize {
        ENTRY_EXTENDED_SIZE + self.signature.total_size()
    }

    /// The byte string the signature covers: metadata magic and
    /// cancellation id in firmware order, then SHA-384 of `payload`.
    pub fn signed_payload(&self, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 48);
        buf.extend_from_slice(&CANCELLATION_METADATA_MAGIC.to_le_bytes());
        buf.extend_from_slice(&self.cancellation_id.to_le_bytes());
        buf.extend_from_slice(&sha::sha384(payload));
        buf
    }
}

impl codicon::Decoder<Actor> for CancellableBlock0Entry {
    type Error = Error;

    fn decode(mut reader: impl Read, actor: Actor) -> Result<Self> {
        let magic = actor.read_u32(&mut reader)?;
        if magic != CANCELLABLE_BLOCK0_MAGIC {
            return Err(Error::bad_magic(
                "cancellable block-0 entry",
                CANCELLABLE_BLOCK0_MAGIC,
                magic,
            ));
        }

        let _length_offset = actor.read_u32(&mut reader)?;
        let _data_length = actor.read_u32(&mut reader)?;
        let signature_length = actor.read_u32(&mut reader)? as usize;
        let _sha_length = actor.read_u32(&mut reader)?;
        let _reserved = actor.read_u32(&mut reader)?;

        let meta_magic = actor.read_u32(&mut reader)?;
        if meta_magic != CANCELLATION_METADATA_MAGIC {
            return Err(Error::bad_magic(
                "cancellable block-0 metadata",
                CANCELLATION_METADATA_MAGIC,
                meta_magic,
            ));
        }
        let cancellation_id = actor.read_u32(&mut reader)?;

        let signature = PsgSignature::decode(&mut reader, actor)?;
        if signature_length != signature.total_size() {
            return Err(Error::StructureParse(format!(
                "cancellable block-0 signature length {signature_length} does not match \
                 signature size {}",
                signature.total_size()
            )));
        }

        Ok(Self {
            cancellation_id,
            signature,
        })
    }
}

impl codicon::Encoder<Actor> for CancellableBlock0Entry {
    type Error = Error;

    fn encode(&self, mut writer: impl Write, actor: Actor) -> Result<()> {
        actor.write_u32(&mut writer, CANCELLABLE_BLOCK0_MAGIC)?;
        actor.write_u32(&mut writer, self.total_size() as u32)?;
        actor.write_u32(&mut writer, 0)?; // data length
        actor.write_u32(&mut writer, self.signature.total_size() as u32)?;
        actor.write_u32(&mut writer, 0)?; // sha length
        actor.write_u32(&mut writer, 0)?; // reserved
        actor.write_u32(&mut writer, CANCELLATION_METADATA_MAGIC)?;
        actor.write_u32(&mut writer, self.cancellation_id)?;

        self.signature.encode(&mut writer, actor)
    }
}

/// Where a wrapped AES root key is stored on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageType {
    Efuse,
    Bbram,
    Pufss,
}

impl TryFrom<u8> for StorageType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(StorageType::Efuse),
            1 => Ok(StorageType::Bbram),
            2 => Ok(StorageType::Pufss),
            v => Err(Error::StructureParse(format!("unknown storage type {v}"))),
        }
    }
}

/// How the AES root key in the entry is wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyWrappingType {
    Unwrapped,
    Uds,
}

impl TryFrom<u8> for KeyWrappingType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(KeyWrappingType::Unwrapped),
            1 => Ok(KeyWrappingType::Uds),
            v => Err(Error::StructureParse(format!(
                "unknown key wrapping type {v}"
            ))),
        }
    }
}

/// An AES root-key provisioning entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AesKeyEntry {
    pub cert_data_length: u32,
    pub cert_version: u32,
    pub cert_type: u32,
    pub storage_type: StorageType,
    pub key_wrapping_type: KeyWrappingType,
    pub user_iv: [u8; 16],
    pub user_aes_root_key: [u8; 32],
    /// Trailing signing-key chain blob, opaque at this layer.
    pub signing_key_chain: Vec<u8>,
}

const AES_KEY_RESERVED_LEN: usize = 10;
const AES_KEY_RESERVED_SECOND_LEN: usize = 48;

impl AesKeyEntry {
    pub fn total_size(&self) -> usize {
        5 * 4
            + 2
            + AES_KEY_RESERVED_LEN
            + self.user_iv.len()
            + self.user_aes_root_key.len()
            + AES_KEY_RESERVED_SECOND_LEN
            + self.signing_key_chain.len()
    }
}

impl codicon::Decoder<Actor> for AesKeyEntry {
    type Error = Error;

    fn decode(mut reader: impl Read, actor: Actor) -> Result<Self> {
        let magic = actor.read_u32(&mut reader)?;
        if magic != AES_KEY_ENTRY_MAGIC {
            return Err(Error::bad_magic("AES key entry", AES_KEY_ENTRY_MAGIC, magic));
        }

        let cert_data_length = actor.read_u32(&mut reader)?;
        let cert_version = actor.read_u32(&mut reader)?;
        let cert_type = actor.read_u32(&mut reader)?;

        let user_cert_magic = actor.read_u32(&mut reader)?;
        if user_cert_magic != USER_AES_CERT_MAGIC {
            return Err(Error::bad_magic(
                "user AES certificate",
                USER_AES_CERT_MAGIC,
                user_cert_magic,
            ));
        }

        let mut bytes = [0u8; 2];
        reader.read_exact(&mut bytes)?;
        let storage_type = StorageType::try_from(bytes[0])?;
        let key_wrapping_type = KeyWrappingType::try_from(bytes[1])?;

        let mut reserved = [0u8; AES_KEY_RESERVED_LEN];
        reader.read_exact(&mut reserved)?;

        let mut user_iv = [0u8; 16];
        reader.read_exact(&mut user_iv)?;
        let mut user_aes_root_key = [0u8; 32];
        reader.read_exact(&mut user_aes_root_key)?;

        let mut reserved_second = [0u8; AES_KEY_RESERVED_SECOND_LEN];
        reader.read_exact(&mut reserved_second)?;

        let mut signing_key_chain = Vec::new();
        reader.read_to_end(&mut signing_key_chain)?;

        Ok(Self {
            cert_data_length,
            cert_version,
            cert_type,
            storage_type,
            key_wrapping_type,
            user_iv,
            user_aes_root_key,
            signing_key_chain,
        })
    }
}

impl codicon::Encoder<Actor> for AesKeyEntry {
    type Error = Error;

    fn encode(&self, mut writer: impl Write, actor: Actor) -> Result<()> {
        actor.write_u32(&mut writer, AES_KEY_ENTRY_MAGIC)?;
        actor.write_u32(&mut writer, self.cert_data_length)?;
        actor.write_u32(&mut writer, self.cert_version)?;
        actor.write_u32(&mut writer, self.cert_type)?;
        actor.write_u32(&mut writer, USER_AES_CERT_MAGIC)?;

        writer.write_all(&[self.storage_type as u8, self.key_wrapping_type as u8])?;
        writer.write_all(&[0u8; AES_KEY_RESERVED_LEN])?;
        writer.write_all(&self.user_iv)?;
        writer.write_all(&self.user_aes_root_key)?;
        writer.write_all(&[0u8; AES_KEY_RESERVED_SECOND_LEN])?;
        writer.write_all(&self.signing_key_chain)?;
        Ok(())
    }
}

/// A PSG entry with its format decided once, at parse time, from the
/// magic value. Downstream code matches on the variant instead of
/// re-checking magics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateEntry {
    Leaf(LeafEntry),
    Root(RootEntry),
    Block0(Block0Entry),
    CancellableBlock0(CancellableBlock0Entry),
    AesKey(AesKeyEntry),
}

impl CertificateEntry {
    /// Parses one entry from `bytes`, dispatching on the leading magic.
    pub fn parse(bytes: &[u8], actor: Actor) -> Result<Self> {
        let magic = peek_magic(bytes, actor)?;
        let mut reader = bytes;
        match magic {
            LEAF_ENTRY_MAGIC => Ok(Self::Leaf(LeafEntry::decode(&mut reader, actor)?)),
            m if super::is_root_magic(m) => Ok(Self::Root(RootEntry::decode(&mut reader, actor)?)),
            BLOCK0_ENTRY_MAGIC => Ok(Self::Block0(Block0Entry::decode(&mut reader, actor)?)),
            CANCELLABLE_BLOCK0_MAGIC => Ok(Self::CancellableBlock0(
                CancellableBlock0Entry::decode(&mut reader, actor)?,
            )),
            AES_KEY_ENTRY_MAGIC => Ok(Self::AesKey(AesKeyEntry::decode(&mut reader, actor)?)),
            m => Err(Error::StructureParse(format!(
                "unknown entry magic {m:#010x}"
            ))),
        }
    }

    /// The embedded public key, if the entry format carries one.
    pub fn pub_key(&self) -> Option<&PsgPublicKey> {
        match self {
            CertificateEntry::Leaf(leaf) => leaf.pub_key.as_ref(),
            CertificateEntry::Root(root) => Some(&root.pub_key),
            _ => None,
        }
    }

    /// The embedded signature, if the entry format carries one.
    pub fn signature(&self) -> Option<&PsgSignature> {
        match self {
            CertificateEntry::Leaf(leaf) => leaf.signature.as_ref(),
            CertificateEntry::Block0(entry) => Some(&entry.signature),
            CertificateEntry::CancellableBlock0(entry) => Some(&entry.signature),
            _ => None,
        }
    }

    /// The entry encoded for `actor`.
    pub fn to_bytes(&self, actor: Actor) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            CertificateEntry::Leaf(e) => e.encode(&mut buf, actor)?,
            CertificateEntry::Root(e) => e.encode(&mut buf, actor)?,
            CertificateEntry::Block0(e) => e.encode(&mut buf, actor)?,
            CertificateEntry::CancellableBlock0(e) => e.encode(&mut buf, actor)?,
            CertificateEntry::AesKey(e) => e.encode(&mut buf, actor)?,
        }
        Ok(buf)
    }
}

/// Reads the leading magic of `bytes` without consuming them.
pub(crate) fn peek_magic(bytes: &[u8], actor: Actor) -> Result<u32> {
    let word: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::StructureParse("buffer too short for an entry magic".into()))?;
    Ok(match actor {
        Actor::Service => u32::from_be_bytes(word),
        Actor::Firmware => u32::from_le_bytes(word),
    })
}
