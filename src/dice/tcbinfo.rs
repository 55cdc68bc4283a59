// Copyright (C) Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0

//! The TcbInfo measurement record and its identity/payload projections.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The only vendor this verifier trusts measurements from.
pub const TRUSTED_VENDOR: &str = "intel.com";

/// Index used by older devices that identify measurements by model.
pub const MEASUREMENT_INDEX: i64 = 0;

/// OID arc under which measurement type OIDs live.
pub const MEASUREMENT_TYPES_ARC: &str = "2.16.840.1.113741.1.15.4";

/// The single FwId digest algorithm this verifier accepts (SHA-384).
pub const FWID_HASH_ALG_SHA384: &str = "2.16.840.1.101.3.4.2.2";

bitflags! {
    /// DICE operational flags, one bit per mode, MSB first as in the
    /// extension's BIT STRING.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct OperationalFlags: u8 {
        const NOT_CONFIGURED = 0b1000_0000;
        const NOT_SECURE     = 0b0100_0000;
        const RECOVERY       = 0b0010_0000;
        const DEBUG          = 0b0001_0000;
    }
}

/// A (hash algorithm, digest) pair identifying a measured firmware
/// component. The digest is kept as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FwIdField {
    pub hash_alg: String,
    pub digest: String,
}

/// Vendor-specific data with an optional comparison mask.
///
/// Two values match when they are equal after ANDing both with the
/// mask; a missing mask on both sides degrades to plain equality, and
/// two differing masks never match.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MaskedVendorInfo {
    pub vendor_info: String,
    pub vendor_info_mask: Option<String>,
}

impl MaskedVendorInfo {
    pub fn new(vendor_info: impl Into<String>) -> Self {
        Self {
            vendor_info: vendor_info.into(),
            vendor_info_mask: None,
        }
    }

    pub fn with_mask(vendor_info: impl Into<String>, mask: impl Into<String>) -> Self {
        Self {
            vendor_info: vendor_info.into(),
            vendor_info_mask: Some(mask.into()),
        }
    }

    /// Mask-respecting partial equality.
    pub fn matches(&self, other: &MaskedVendorInfo) -> bool {
        let mask = match (
            self.vendor_info_mask.as_deref(),
            other.vendor_info_mask.as_deref(),
        ) {
            (None, None) => return self.vendor_info.eq_ignore_ascii_case(&other.vendor_info),
            // Two records disagreeing on the mask itself describe
            // incompatible comparison domains.
            (Some(a), Some(b)) => {
                if !a.eq_ignore_ascii_case(b) {
                    return false;
                }
                a
            }
            (Some(mask), None) | (None, Some(mask)) => mask,
        };
        match (
            apply_mask(&self.vendor_info, mask),
            apply_mask(&other.vendor_info, mask),
        ) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

fn apply_mask(value: &str, mask: &str) -> Option<Vec<u8>> {
    let value = hex::decode(value).ok()?;
    let mask = hex::decode(mask).ok()?;
    if value.len() != mask.len() {
        return None;
    }
    Some(value.iter().zip(mask.iter()).map(|(v, m)| v & m).collect())
}

/// One DICE TcbInfo record, all fields optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcbInfo {
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub version: Option<String>,
    pub svn: Option<i64>,
    pub layer: Option<i64>,
    pub index: Option<i64>,
    pub fwid: Option<FwIdField>,
    pub flags: Option<OperationalFlags>,
    pub vendor_info: Option<MaskedVendorInfo>,
    #[serde(rename = "type")]
    pub measurement_type: Option<String>,
}

/// Measurement categories every complete chain must report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementType {
    RomExtension,
    Cmf,
}

impl MeasurementType {
    /// The type OID used by newer devices.
    pub fn oid(self) -> String {
        match self {
            MeasurementType::RomExtension => format!("{MEASUREMENT_TYPES_ARC}.2"),
            MeasurementType::Cmf => format!("{MEASUREMENT_TYPES_ARC}.3"),
        }
    }

    /// The DICE layer the measurement is reported at.
    pub fn layer(self) -> i64 {
        match self {
            MeasurementType::RomExtension => 0,
            MeasurementType::Cmf => 1,
        }
    }
}

/// Identity projection of a TcbInfo: two records with equal keys
/// describe the same measured component.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TcbInfoKey {
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub layer: Option<i64>,
    pub index: Option<i64>,
    #[serde(rename = "type")]
    pub measurement_type: Option<String>,
}

impl TcbInfoKey {
    /// The key shape used by newer devices: vendor, type and layer.
    pub fn from_measurement(measurement: MeasurementType) -> Self {
        Self {
            vendor: Some(TRUSTED_VENDOR.to_string()),
            layer: Some(measurement.layer()),
            measurement_type: Some(measurement.oid()),
            ..Self::default()
        }
    }

    /// The key shape used by older devices: vendor, model, layer and
    /// index.
    pub fn from_measurement_with_model(measurement: MeasurementType, model: &str) -> Self {
        Self {
            vendor: Some(TRUSTED_VENDOR.to_string()),
            model: Some(model.to_string()),
            layer: Some(measurement.layer()),
            index: Some(MEASUREMENT_INDEX),
            ..Self::default()
        }
    }
}

impl From<&TcbInfo> for TcbInfoKey {
    fn from(tcb_info: &TcbInfo) -> Self {
        Self {
            vendor: tcb_info.vendor.clone(),
            model: tcb_info.model.clone(),
            layer: tcb_info.layer,
            index: tcb_info.index,
            measurement_type: tcb_info.measurement_type.clone(),
        }
    }
}

impl fmt::Display for TcbInfoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TcbInfoKey(")?;
        if let Some(vendor) = &self.vendor {
            write!(f, " vendor={vendor}")?;
        }
        if let Some(model) = &self.model {
            write!(f, " model={model}")?;
        }
        if let Some(layer) = self.layer {
            write!(f, " layer={layer}")?;
        }
        if let Some(index) = self.index {
            write!(f, " index={index}")?;
        }
        if let Some(measurement_type) = &self.measurement_type {
            write!(f, " type={measurement_type}")?;
        }
        write!(f, " )")
    }
}

/// Payload projection of a TcbInfo: the measured values themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcbInfoValue {
    pub version: Option<String>,
    pub svn: Option<i64>,
    pub fwid: Option<FwIdField>,
    pub vendor_info: Option<MaskedVendorInfo>,
    pub flags: Option<OperationalFlags>,
}

impl From<&TcbInfo> for TcbInfoValue {
    fn from(tcb_info: &TcbInfo) -> Self {
        Self {
            version: tcb_info.version.clone(),
            svn: tcb_info.svn,
            fwid: tcb_info.fwid.clone(),
            vendor_info: tcb_info.vendor_info.clone(),
            flags: tcb_info.flags,
        }
    }
}

impl TcbInfoValue {
    /// Partial equality: fields absent on either side are compatible,
    /// FwId compares by declared content and VendorInfo respects its
    /// mask. Used both for aggregation conflicts and reference
    /// matching.
    pub fn matches(&self, other: &TcbInfoValue) -> bool {
        fn compatible<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }

        let vendor_info_ok = match (&self.vendor_info, &other.vendor_info) {
            (Some(a), Some(b)) => a.matches(b),
            _ => true,
        };

        compatible(&self.version, &other.version)
            && compatible(&self.svn, &other.svn)
            && compatible(&self.fwid, &other.fwid)
            && vendor_info_ok
            && compatible(&self.flags, &other.flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_vendor_info_compares_unmasked_bits_only() {
        let reference = MaskedVendorInfo::with_mask("0102", "FF00");
        let measured = MaskedVendorInfo::new("01FF");
        assert!(reference.matches(&measured));
        assert!(measured.matches(&reference));

        let other = MaskedVendorInfo::new("02FF");
        assert!(!reference.matches(&other));
    }

    #[test]
    fn masked_vendor_info_differing_masks_never_match() {
        let value = "0011001100001111";
        let first = MaskedVendorInfo::with_mask(value, "FFFFFFFF000000FF");
        let second = MaskedVendorInfo::with_mask(value, "AAAAAAAAAAAAAAAA");
        assert!(!first.matches(&second));
        assert!(!second.matches(&first));

        // Same mask, case-insensitive, still matches.
        let third = MaskedVendorInfo::with_mask(value, "ffffffff000000ff");
        assert!(first.matches(&third));
    }

    #[test]
    fn masked_vendor_info_length_mismatch_never_matches() {
        let reference = MaskedVendorInfo::with_mask("0102", "FF");
        assert!(!reference.matches(&MaskedVendorInfo::new("0102")));
    }

    #[test]
    fn value_partial_equality_treats_absent_fields_as_compatible() {
        let full = TcbInfoValue {
            svn: Some(3),
            fwid: Some(FwIdField {
                hash_alg: FWID_HASH_ALG_SHA384.into(),
                digest: "aa".into(),
            }),
            ..TcbInfoValue::default()
        };
        let sparse = TcbInfoValue {
            svn: Some(3),
            ..TcbInfoValue::default()
        };
        assert!(full.matches(&sparse));

        let conflicting = TcbInfoValue {
            fwid: Some(FwIdField {
                hash_alg: FWID_HASH_ALG_SHA384.into(),
                digest: "bb".into(),
            }),
            ..TcbInfoValue::default()
        };
        assert!(!full.matches(&conflicting));
    }

    #[test]
    fn key_shapes_for_required_measurements() {
        let newer = TcbInfoKey::from_measurement(MeasurementType::Cmf);
        assert_eq!(newer.layer, Some(1));
        assert_eq!(newer.measurement_type.as_deref(), Some("2.16.840.1.113741.1.15.4.3"));
        assert!(newer.model.is_none());

        let older = TcbInfoKey::from_measurement_with_model(MeasurementType::Cmf, "Agilex");
        assert_eq!(older.model.as_deref(), Some("Agilex"));
        assert_eq!(older.index, Some(0));
        assert!(older.measurement_type.is_none());
    }
}
