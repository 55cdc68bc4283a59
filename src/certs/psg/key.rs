// Copyright (C) Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0

//! The PSG public-key sub-structure.

use super::Actor;
use crate::error::{Error, Result};
use openssl::{bn, ec, nid, pkey, sha};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Magic of a regular public-key metadata block.
pub const PUBKEY_MAGIC: u32 = 0x5870_0660;

/// Magic of a manifest public-key metadata block.
pub const MANIFEST_PUBKEY_MAGIC: u32 = 0x4065_6643;

/// Size of the public-key metadata block in bytes: six 4-byte fields.
pub const PUBKEY_METADATA_SIZE: usize = 24;

/// The EC curve a PSG key or signature lives on.
///
/// The curve is identified on the wire by dedicated magics, one pair
/// per curve (key metadata and signature hash metadata), and determines
/// the coordinate width and the digest used for signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveType {
    Secp256r1,
    Secp384r1,
}

impl CurveType {
    /// Width in bytes of one affine coordinate or signature component.
    pub const fn size(self) -> usize {
        match self {
            CurveType::Secp256r1 => 32,
            CurveType::Secp384r1 => 48,
        }
    }

    /// The magic carried in the public-key metadata.
    pub const fn key_magic(self) -> u32 {
        match self {
            CurveType::Secp256r1 => 0x6632_7145,
            CurveType::Secp384r1 => 0x5432_6648,
        }
    }

    /// The magic carried in the signature metadata.
    pub const fn sig_hash_magic(self) -> u32 {
        match self {
            CurveType::Secp256r1 => 0x3025_1120,
            CurveType::Secp384r1 => 0x3054_8820,
        }
    }

    pub fn from_key_magic(magic: u32) -> Result<Self> {
        match magic {
            m if m == CurveType::Secp256r1.key_magic() => Ok(CurveType::Secp256r1),
            m if m == CurveType::Secp384r1.key_magic() => Ok(CurveType::Secp384r1),
            m => Err(Error::StructureParse(format!(
                "invalid curve type magic {m:#010x}"
            ))),
        }
    }

    pub fn from_sig_hash_magic(magic: u32) -> Result<Self> {
        match magic {
            m if m == CurveType::Secp256r1.sig_hash_magic() => Ok(CurveType::Secp256r1),
            m if m == CurveType::Secp384r1.sig_hash_magic() => Ok(CurveType::Secp384r1),
            m => Err(Error::StructureParse(format!(
                "invalid signature hash magic {m:#010x}"
            ))),
        }
    }

    /// The curve derived from a coordinate width, used when an entry
    /// only exposes its raw point.
    pub fn from_coordinate_size(size: usize) -> Result<Self> {
        match size {
            32 => Ok(CurveType::Secp256r1),
            48 => Ok(CurveType::Secp384r1),
            s => Err(Error::StructureParse(format!(
                "no curve with {s}-byte coordinates"
            ))),
        }
    }

    pub(crate) fn nid(self) -> nid::Nid {
        match self {
            CurveType::Secp256r1 => nid::Nid::X9_62_PRIME256V1,
            CurveType::Secp384r1 => nid::Nid::SECP384R1,
        }
    }
}

/// An EC public key as carried inside a PSG certificate entry.
///
/// Coordinates are held in service (big-endian) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsgEccKey {
    pub magic: u32,
    pub curve: CurveType,
    pub permissions: u32,
    pub cancellation: u32,
    pub x: Vec<u8>,
    pub y: Vec<u8>,
}

impl PsgEccKey {
    /// Total encoded size: metadata plus both coordinates.
    pub fn total_size(&self) -> usize {
        PUBKEY_METADATA_SIZE + 2 * self.curve.size()
    }

    /// SHA-256 fingerprint over X ‖ Y, used to match a chain's root
    /// against the trusted root.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = sha::Sha256::new();
        hasher.update(&self.x);
        hasher.update(&self.y);
        hasher.finish()
    }

    /// The most significant hash word stored in root entries: the
    /// first big-endian word of the curve-matched digest over X ‖ Y.
    pub fn hash_msb(&self) -> u32 {
        let word: [u8; 4] = match self.curve {
            CurveType::Secp256r1 => {
                let mut hasher = sha::Sha256::new();
                hasher.update(&self.x);
                hasher.update(&self.y);
                hasher.finish()[..4].try_into().unwrap_or([0; 4])
            }
            CurveType::Secp384r1 => {
                let mut hasher = sha::Sha384::new();
                hasher.update(&self.x);
                hasher.update(&self.y);
                hasher.finish()[..4].try_into().unwrap_or([0; 4])
            }
        };
        u32::from_be_bytes(word)
    }

    /// Checks that (X, Y) is a valid point on the declared curve.
    pub fn verify_point(&self) -> Result<()> {
        ec::EcKey::<pkey::Public>::try_from(self).map(|_| ())
    }
}

impl TryFrom<&PsgEccKey> for ec::EcKey<pkey::Public> {
    type Error = Error;

    fn try_from(value: &PsgEccKey) -> Result<Self> {
        let group = ec::EcGroup::from_curve_name(value.curve.nid())?;
        let key = ec::EcKey::from_public_key_affine_coordinates(
            &group,
            &*bn::BigNum::from_slice(&value.x)?,
            &*bn::BigNum::from_slice(&value.y)?,
        )
        .map_err(|_| Error::StructureParse("public key is not a valid curve point".into()))?;
        Ok(key)
    }
}

/// The public-key section of a PSG entry.
///
/// The empty variant is a reserved all-zero metadata block of fixed
/// length with no curve point; unsigned manifests carry it as a
/// placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PsgPublicKey {
    Empty,
    Ecc(PsgEccKey),
}

impl PsgPublicKey {
    pub fn total_size(&self) -> usize {
        match self {
            PsgPublicKey::Empty => PUBKEY_METADATA_SIZE,
            PsgPublicKey::Ecc(key) => key.total_size(),
        }
    }

    /// The contained key, or an error when the section is empty.
    pub fn as_ecc(&self) -> Result<&PsgEccKey> {
        match self {
            PsgPublicKey::Ecc(key) => Ok(key),
            PsgPublicKey::Empty => Err(Error::StructureParse(
                "entry carries an empty public key".into(),
            )),
        }
    }

    /// The section encoded for `actor`, without going through a
    /// writer. This is the byte string a parent signs.
    pub fn to_bytes(&self, actor: Actor) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.total_size());
        codicon::Encoder::encode(self, &mut buf, actor)?;
        Ok(buf)
    }
}

impl codicon::Decoder<Actor> for PsgPublicKey {
    type Error = Error;

    fn decode(mut reader: impl Read, actor: Actor) -> Result<Self> {
        let magic = actor.read_u32(&mut reader)?;
        let size_x = actor.read_u32(&mut reader)?;
        let size_y = actor.read_u32(&mut reader)?;
        let curve_magic = actor.read_u32(&mut reader)?;
        let permissions = actor.read_u32(&mut reader)?;
        let cancellation = actor.read_u32(&mut reader)?;

        if magic == 0 {
            if size_x != 0 || size_y != 0 || curve_magic != 0 || permissions != 0 || cancellation != 0
            {
                return Err(Error::StructureParse(
                    "empty public key metadata is not all-zero".into(),
                ));
            }
            return Ok(PsgPublicKey::Empty);
        }

        if magic != PUBKEY_MAGIC && magic != MANIFEST_PUBKEY_MAGIC {
            return Err(Error::bad_magic("public key metadata", PUBKEY_MAGIC, magic));
        }

        let curve = CurveType::from_key_magic(curve_magic)?;
        let expected = curve.size() as u32;
        if size_x != expected || size_y != expected {
            return Err(Error::StructureParse(format!(
                "public key declares sizes ({size_x}, {size_y}), curve requires {expected}"
            )));
        }

        let x = actor.read_words(&mut reader, curve.size())?;
        let y = actor.read_words(&mut reader, curve.size())?;

        Ok(PsgPublicKey::Ecc(PsgEccKey {
            magic,
            curve,
            permissions,
            cancellation,
            x,
            y,
        }))
    }
}

impl codicon::Encoder<Actor> for PsgPublicKey {
    type Error = Error;

    fn encode(&self, mut writer: impl Write, actor: Actor) -> Result<()> {
        match self {
            PsgPublicKey::Empty => Ok(writer.write_all(&[0u8; PUBKEY_METADATA_SIZE])?),
            PsgPublicKey::Ecc(key) => {
                actor.write_u32(&mut writer, key.magic)?;
                actor.write_u32(&mut writer, key.curve.size() as u32)?;
                actor.write_u32(&mut writer, key.curve.size() as u32)?;
                actor.write_u32(&mut writer, key.curve.key_magic())?;
                actor.write_u32(&mut writer, key.permissions)?;
                actor.write_u32(&mut writer, key.cancellation)?;
                actor.write_words(&mut writer, &key.x)?;
                actor.write_words(&mut writer, &key.y)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codicon::{Decoder, Encoder};

    fn sample_key() -> PsgPublicKey {
        PsgPublicKey::Ecc(PsgEccKey {
            magic: PUBKEY_MAGIC,
            curve: CurveType::Secp384r1,
            permissions: 0,
            cancellation: 0,
            x: (0..48).collect(),
            y: (48..96).collect(),
        })
    }

    #[test]
    fn round_trip_both_actors() {
        for actor in [Actor::Service, Actor::Firmware] {
            let key = sample_key();
            let mut buf = Vec::new();
            key.encode(&mut buf, actor).unwrap();
            assert_eq!(buf.len(), key.total_size());
            let back = PsgPublicKey::decode(&mut &buf[..], actor).unwrap();
            assert_eq!(back, key);
        }
    }

    #[test]
    fn empty_round_trip() {
        let mut buf = Vec::new();
        PsgPublicKey::Empty.encode(&mut buf, Actor::Firmware).unwrap();
        assert_eq!(buf, vec![0u8; PUBKEY_METADATA_SIZE]);
        let back = PsgPublicKey::decode(&mut &buf[..], Actor::Service).unwrap();
        assert_eq!(back, PsgPublicKey::Empty);
    }

    #[test]
    fn firmware_encoding_swaps_words() {
        let key = sample_key();
        let mut service = Vec::new();
        let mut firmware = Vec::new();
        key.encode(&mut service, Actor::Service).unwrap();
        key.encode(&mut firmware, Actor::Firmware).unwrap();
        assert_eq!(&service[..4], &PUBKEY_MAGIC.to_be_bytes());
        assert_eq!(&firmware[..4], &PUBKEY_MAGIC.to_le_bytes());
        // first point word
        assert_eq!(&service[24..28], &[0, 1, 2, 3]);
        assert_eq!(&firmware[24..28], &[3, 2, 1, 0]);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buf = Vec::new();
        sample_key().encode(&mut buf, Actor::Service).unwrap();
        buf[0] ^= 0xFF;
        let err = PsgPublicKey::decode(&mut &buf[..], Actor::Service).unwrap_err();
        assert!(matches!(err, Error::StructureParse(_)));
    }

    #[test]
    fn truncated_point_is_rejected() {
        let mut buf = Vec::new();
        sample_key().encode(&mut buf, Actor::Service).unwrap();
        buf.truncate(40);
        assert!(PsgPublicKey::decode(&mut &buf[..], Actor::Service).is_err());
    }
}
