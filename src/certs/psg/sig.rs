// Copyright (C) Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0

//! The PSG signature sub-structure.

use super::{key::CurveType, Actor};
use crate::error::{Error, Result};
use crate::util::AsBeBytes;
use openssl::{bn, ecdsa};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Magic of a signature metadata block.
pub const SIGNATURE_MAGIC: u32 = 0x7488_1520;

/// Size of the signature metadata block in bytes: four 4-byte fields.
pub const SIGNATURE_METADATA_SIZE: usize = 16;

/// An ECDSA signature as carried inside a PSG entry: fixed-width R and
/// S components in service (big-endian) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsgSignature {
    pub curve: CurveType,
    pub r: Vec<u8>,
    pub s: Vec<u8>,
}

impl PsgSignature {
    /// Total encoded size: metadata plus both components.
    pub fn total_size(&self) -> usize {
        SIGNATURE_METADATA_SIZE + 2 * self.curve.size()
    }

    /// A placeholder with all-zero components, as used by unsigned
    /// block-0 structures prior to signing.
    pub fn zeroed(curve: CurveType) -> Self {
        Self {
            curve,
            r: vec![0; curve.size()],
            s: vec![0; curve.size()],
        }
    }

    /// Whether both components are all-zero placeholders.
    pub fn is_zeroed(&self) -> bool {
        self.r.iter().chain(self.s.iter()).all(|b| *b == 0)
    }

    /// Converts a DER-encoded ECDSA signature into the fixed-width
    /// wire components.
    pub fn from_der(der: &[u8], curve: CurveType) -> Result<Self> {
        let sig = ecdsa::EcdsaSig::from_der(der)
            .map_err(|_| Error::StructureParse("signature is not valid DER".into()))?;
        Ok(Self {
            curve,
            r: sig.r().as_be_bytes(curve.size())?,
            s: sig.s().as_be_bytes(curve.size())?,
        })
    }
}

impl TryFrom<&PsgSignature> for ecdsa::EcdsaSig {
    type Error = Error;

    #[inline]
    fn try_from(value: &PsgSignature) -> Result<Self> {
        let r = bn::BigNum::from_slice(&value.r)?;
        let s = bn::BigNum::from_slice(&value.s)?;
        Ok(ecdsa::EcdsaSig::from_private_components(r, s)?)
    }
}

impl TryFrom<&PsgSignature> for Vec<u8> {
    type Error = Error;

    #[inline]
    fn try_from(value: &PsgSignature) -> Result<Self> {
        Ok(ecdsa::EcdsaSig::try_from(value)?.to_der()?)
    }
}

impl codicon::Decoder<Actor> for PsgSignature {
    type Error = Error;

    fn decode(mut reader: impl Read, actor: Actor) -> Result<Self> {
        let magic = actor.read_u32(&mut reader)?;
        if magic != SIGNATURE_MAGIC {
            return Err(Error::bad_magic("signature metadata", SIGNATURE_MAGIC, magic));
        }

        let size_r = actor.read_u32(&mut reader)?;
        let size_s = actor.read_u32(&mut reader)?;
        let curve = CurveType::from_sig_hash_magic(actor.read_u32(&mut reader)?)?;

        let width = curve.size() as u32;
        if size_r > width || size_s > width {
            return Err(Error::StructureParse(format!(
                "signature declares sizes ({size_r}, {size_s}) beyond component width {width}"
            )));
        }

        let r = actor.read_words(&mut reader, curve.size())?;
        let s = actor.read_words(&mut reader, curve.size())?;

        Ok(Self { curve, r, s })
    }
}

impl codicon::Encoder<Actor> for PsgSignature {
    type Error = Error;

    fn encode(&self, mut writer: impl Write, actor: Actor) -> Result<()> {
        // A placeholder declares zero component sizes; the components
        // still occupy the full curve width.
        let (size_r, size_s) = if self.is_zeroed() {
            (0, 0)
        } else {
            (self.r.len() as u32, self.s.len() as u32)
        };
        actor.write_u32(&mut writer, SIGNATURE_MAGIC)?;
        actor.write_u32(&mut writer, size_r)?;
        actor.write_u32(&mut writer, size_s)?;
        actor.write_u32(&mut writer, self.curve.sig_hash_magic())?;
        actor.write_words(&mut writer, &self.r)?;
        actor.write_words(&mut writer, &self.s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codicon::{Decoder, Encoder};

    fn sample() -> PsgSignature {
        PsgSignature {
            curve: CurveType::Secp384r1,
            r: (0..48).collect(),
            s: (0..48).rev().collect(),
        }
    }

    #[test]
    fn round_trip_both_actors() {
        for actor in [Actor::Service, Actor::Firmware] {
            let sig = sample();
            let mut buf = Vec::new();
            sig.encode(&mut buf, actor).unwrap();
            assert_eq!(buf.len(), sig.total_size());
            assert_eq!(PsgSignature::decode(&mut &buf[..], actor).unwrap(), sig);
        }
    }

    #[test]
    fn zeroed_signature_encodes_in_firmware_order() {
        // The empty secp384r1 signature as the device emits it.
        let expected = {
            let mut buf = Vec::new();
            buf.extend_from_slice(&SIGNATURE_MAGIC.to_le_bytes());
            buf.extend_from_slice(&[0u8; 8]);
            buf.extend_from_slice(&CurveType::Secp384r1.sig_hash_magic().to_le_bytes());
            buf.extend_from_slice(&[0u8; 96]);
            buf
        };

        let mut buf = Vec::new();
        PsgSignature::zeroed(CurveType::Secp384r1)
            .encode(&mut buf, Actor::Firmware)
            .unwrap();
        assert_eq!(buf, expected);
    }

    #[test]
    fn der_conversion_round_trips() {
        let sig = sample();
        let der: Vec<u8> = (&sig).try_into().unwrap();
        let back = PsgSignature::from_der(&der, CurveType::Secp384r1).unwrap();
        // R begins with a zero byte which DER strips; the fixed-width
        // form restores it.
        assert_eq!(back, sig);
    }

    #[test]
    fn wrong_hash_magic_is_rejected() {
        let mut buf = Vec::new();
        sample().encode(&mut buf, Actor::Service).unwrap();
        buf[12..16].copy_from_slice(&0xDEAD_BEEFu32.to_be_bytes());
        assert!(PsgSignature::decode(&mut &buf[..], Actor::Service).is_err());
    }
}
