// Copyright (C) Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0

//! DER extraction of DiceTcbInfo extensions.
//!
//! `DiceTcbInfo` is a SEQUENCE of implicitly-tagged optional fields
//! (tags 0 through 9). The multi variant wraps a SEQUENCE OF such
//! structures in a single extension.

use crate::dice::tcbinfo::{FwIdField, MaskedVendorInfo, OperationalFlags, TcbInfo};
use crate::error::{Error, Result};
use x509_parser::der_parser::asn1_rs::{oid, Any, Class, FromDer, Oid, Tag};
use x509_parser::extensions::X509Extension;
use x509_parser::prelude::{RevokedCertificate, X509Certificate};

/// tcg-dice-TcbInfo
pub const TCB_INFO_OID: Oid<'static> = oid!(2.23.133 .5 .4 .1);
/// tcg-dice-MultiTcbInfo
pub const MULTI_TCB_INFO_OID: Oid<'static> = oid!(2.23.133 .5 .4 .5);

const TAG_VENDOR: u32 = 0;
const TAG_MODEL: u32 = 1;
const TAG_VERSION: u32 = 2;
const TAG_SVN: u32 = 3;
const TAG_LAYER: u32 = 4;
const TAG_INDEX: u32 = 5;
const TAG_FWIDS: u32 = 6;
const TAG_FLAGS: u32 = 7;
const TAG_VENDOR_INFO: u32 = 8;
const TAG_TYPE: u32 = 9;

/// Extracts [`TcbInfo`] structures from certificates and CRL entries.
///
/// Certificates without either extension yield an empty list.
pub struct TcbInfoExtractor;

impl TcbInfoExtractor {
    /// Returns every TcbInfo carried by `cert`, single extension first.
    pub fn extract(cert: &X509Certificate) -> Result<Vec<TcbInfo>> {
        let single = cert
            .get_extension_unique(&TCB_INFO_OID)
            .map_err(|e| Error::X509(e.to_string()))?;
        let multi = cert
            .get_extension_unique(&MULTI_TCB_INFO_OID)
            .map_err(|e| Error::X509(e.to_string()))?;
        Self::from_extensions(single, multi)
    }

    /// Returns every TcbInfo carried by a revoked-certificate entry.
    pub fn extract_from_crl_entry(entry: &RevokedCertificate) -> Result<Vec<TcbInfo>> {
        let single = entry.extensions().iter().find(|e| e.oid == TCB_INFO_OID);
        let multi = entry
            .extensions()
            .iter()
            .find(|e| e.oid == MULTI_TCB_INFO_OID);
        Self::from_extensions(single, multi)
    }

    fn from_extensions(
        single: Option<&X509Extension>,
        multi: Option<&X509Extension>,
    ) -> Result<Vec<TcbInfo>> {
        let mut infos = Vec::new();
        if let Some(ext) = single {
            infos.push(Self::parse_single(ext.value)?);
        }
        if let Some(ext) = multi {
            infos.extend(Self::parse_multi(ext.value)?);
        }
        Ok(infos)
    }

    fn parse_single(der: &[u8]) -> Result<TcbInfo> {
        let (_, seq) = Any::from_der(der).map_err(|e| structure(&e))?;
        expect_sequence(&seq)?;
        Self::parse_fields(seq.data)
    }

    fn parse_multi(der: &[u8]) -> Result<Vec<TcbInfo>> {
        let (_, outer) = Any::from_der(der).map_err(|e| structure(&e))?;
        expect_sequence(&outer)?;

        let mut infos = Vec::new();
        let mut rest = outer.data;
        while !rest.is_empty() {
            let (tail, inner) = Any::from_der(rest).map_err(|e| structure(&e))?;
            expect_sequence(&inner)?;
            infos.push(Self::parse_fields(inner.data)?);
            rest = tail;
        }
        Ok(infos)
    }

    fn parse_fields(mut data: &[u8]) -> Result<TcbInfo> {
        let mut info = TcbInfo::default();
        while !data.is_empty() {
            let (rest, field) = Any::from_der(data).map_err(|e| structure(&e))?;
            data = rest;
            if field.header.class() != Class::ContextSpecific {
                return Err(Error::StructureParse(format!(
                    "unexpected class {:?} inside DiceTcbInfo",
                    field.header.class()
                )));
            }
            match field.header.tag().0 {
                TAG_VENDOR => info.vendor = Some(utf8(field.data)?),
                TAG_MODEL => info.model = Some(utf8(field.data)?),
                TAG_VERSION => info.version = Some(utf8(field.data)?),
                TAG_SVN => info.svn = Some(integer(field.data)?),
                TAG_LAYER => info.layer = Some(integer(field.data)?),
                TAG_INDEX => info.index = Some(integer(field.data)?),
                TAG_FWIDS => info.fwid = Some(Self::parse_fwids(field.data)?),
                TAG_FLAGS => info.flags = Some(flags(field.data)?),
                TAG_VENDOR_INFO => {
                    info.vendor_info = Some(MaskedVendorInfo::new(hex::encode(field.data)))
                }
                TAG_TYPE => info.measurement_type = Some(oid_string(field.data)?),
                tag => {
                    return Err(Error::StructureParse(format!(
                        "unexpected tag [{tag}] inside DiceTcbInfo"
                    )))
                }
            }
        }
        Ok(info)
    }

    /// FWIDLIST must hold exactly one FWID.
    fn parse_fwids(mut data: &[u8]) -> Result<FwIdField> {
        let mut fwid = None;
        while !data.is_empty() {
            let (rest, seq) = Any::from_der(data).map_err(|e| structure(&e))?;
            data = rest;
            expect_sequence(&seq)?;
            if fwid.is_some() {
                return Err(Error::MultipleFwIds);
            }

            let (digest_der, hash_alg) = Oid::from_der(seq.data).map_err(|e| structure(&e))?;
            let (_, digest) = Any::from_der(digest_der).map_err(|e| structure(&e))?;
            if digest.header.tag() != Tag::OctetString {
                return Err(Error::StructureParse(format!(
                    "FWID digest has tag {:?}, OCTET STRING expected",
                    digest.header.tag()
                )));
            }
            fwid = Some(FwIdField {
                hash_alg: hash_alg.to_id_string(),
                digest: hex::encode(digest.data),
            });
        }
        fwid.ok_or_else(|| Error::StructureParse("empty FWIDLIST".into()))
    }
}

fn expect_sequence(any: &Any) -> Result<()> {
    if any.header.tag() != Tag::Sequence || !any.header.constructed() {
        return Err(Error::StructureParse(format!(
            "tag {:?} where SEQUENCE expected",
            any.header.tag()
        )));
    }
    Ok(())
}

fn structure<E: std::fmt::Display>(err: &E) -> Error {
    Error::StructureParse(format!("malformed DiceTcbInfo: {err}"))
}

fn utf8(data: &[u8]) -> Result<String> {
    String::from_utf8(data.to_vec())
        .map_err(|_| Error::StructureParse("non-UTF8 string inside DiceTcbInfo".into()))
}

/// Big-endian two's-complement INTEGER content.
fn integer(data: &[u8]) -> Result<i64> {
    if data.is_empty() || data.len() > 8 {
        return Err(Error::StructureParse(format!(
            "INTEGER of {} bytes inside DiceTcbInfo",
            data.len()
        )));
    }
    let mut value = if data[0] & 0x80 != 0 { -1i64 } else { 0 };
    for byte in data {
        value = (value << 8) | i64::from(*byte);
    }
    Ok(value)
}

/// BIT STRING content, MSB-first. One padding byte precedes the bits.
fn flags(data: &[u8]) -> Result<OperationalFlags> {
    match data {
        [_unused, first, ..] => OperationalFlags::from_bits(*first).ok_or_else(|| {
            Error::StructureParse(format!(
                "unknown operational flag bits in {first:#04x}"
            ))
        }),
        _ => Ok(OperationalFlags::empty()),
    }
}

fn oid_string(data: &[u8]) -> Result<String> {
    let oid = Oid::new(std::borrow::Cow::Borrowed(data));
    Ok(oid.to_id_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // DiceTcbInfo SEQUENCE { vendor [0] "intel.com", svn [3] 17,
    // layer [4] 0, fwids [6] { { sha384, 0xAB 0xCD } },
    // flags [7] '0010'B }
    fn sample_tcb_info() -> Vec<u8> {
        let mut fields = Vec::new();
        fields.extend_from_slice(&[0x80, 9]);
        fields.extend_from_slice(b"intel.com");
        fields.extend_from_slice(&[0x83, 1, 17]);
        fields.extend_from_slice(&[0x84, 1, 0]);
        // FWID: OID 2.16.840.1.101.3.4.2.2 + OCTET STRING ABCD
        let fwid = [
            0x30, 0x0f, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02, 0x04,
            0x02, 0xAB, 0xCD,
        ];
        fields.extend_from_slice(&[0xa6, fwid.len() as u8]);
        fields.extend_from_slice(&fwid);
        fields.extend_from_slice(&[0x87, 2, 0x04, 0x20]);

        let mut der = vec![0x30, fields.len() as u8];
        der.extend_from_slice(&fields);
        der
    }

    #[test]
    fn parses_tagged_fields() {
        let info = TcbInfoExtractor::parse_single(&sample_tcb_info()).unwrap();
        assert_eq!(info.vendor.as_deref(), Some("intel.com"));
        assert_eq!(info.svn, Some(17));
        assert_eq!(info.layer, Some(0));
        let fwid = info.fwid.unwrap();
        assert_eq!(fwid.hash_alg, "2.16.840.1.101.3.4.2.2");
        assert_eq!(fwid.digest, "abcd");
        assert_eq!(info.flags, Some(OperationalFlags::RECOVERY));
    }

    #[test]
    fn rejects_second_fwid() {
        let mut fields = Vec::new();
        let fwid = [
            0x30, 0x0f, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02, 0x04,
            0x02, 0xAB, 0xCD,
        ];
        fields.extend_from_slice(&[0xa6, (fwid.len() * 2) as u8]);
        fields.extend_from_slice(&fwid);
        fields.extend_from_slice(&fwid);
        let mut der = vec![0x30, fields.len() as u8];
        der.extend_from_slice(&fields);

        assert!(matches!(
            TcbInfoExtractor::parse_single(&der),
            Err(Error::MultipleFwIds)
        ));
    }

    #[test]
    fn parses_multi_extension() {
        let single = sample_tcb_info();
        let mut der = vec![0x30, (single.len() * 2) as u8];
        der.extend_from_slice(&single);
        der.extend_from_slice(&single);

        let infos = TcbInfoExtractor::parse_multi(&der).unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[1].svn, Some(17));
    }

    #[test]
    fn unknown_flag_bits_are_rejected() {
        // flags [7] with bit 4 raised, which no operational mode owns.
        let fields = [0x87, 2, 0x04, 0x28];
        let mut der = vec![0x30, fields.len() as u8];
        der.extend_from_slice(&fields);

        assert!(matches!(
            TcbInfoExtractor::parse_single(&der),
            Err(Error::StructureParse(_))
        ));
        assert_eq!(flags(&[0x04, 0x20]).unwrap(), OperationalFlags::RECOVERY);
    }

    #[test]
    fn negative_integer_content() {
        assert_eq!(integer(&[0xFF]).unwrap(), -1);
        assert_eq!(integer(&[0x00, 0xFF]).unwrap(), 255);
        assert!(integer(&[]).is_err());
    }
}
