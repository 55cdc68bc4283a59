// Copyright (C) Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0

//! Aggregation of TcbInfo records across a certificate chain.

use crate::dice::parser::TcbInfoExtractor;
use crate::dice::tcbinfo::{TcbInfo, TcbInfoKey, TcbInfoValue};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use x509_parser::prelude::X509Certificate;

/// Collects measurements keyed by identity, rejecting conflicts.
///
/// The same key may appear in several certificates of one chain. That
/// is fine as long as every occurrence reports a matching value; two
/// different values for one key mean the chain contradicts itself.
#[derive(Debug, Default)]
pub struct TcbInfoAggregator {
    map: BTreeMap<TcbInfoKey, TcbInfoValue>,
}

impl TcbInfoAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extracts and aggregates every TcbInfo carried by `cert`.
    pub fn add_certificate(&mut self, cert: &X509Certificate) -> Result<()> {
        for info in TcbInfoExtractor::extract(cert)? {
            self.add(&info)?;
        }
        Ok(())
    }

    /// Records one TcbInfo. Re-adding an equivalent record is a no-op;
    /// a conflicting value for a known key fails.
    pub fn add(&mut self, info: &TcbInfo) -> Result<()> {
        let key = TcbInfoKey::from(info);
        let value = TcbInfoValue::from(info);
        match self.map.get(&key) {
            None => {
                self.map.insert(key, value);
                Ok(())
            }
            Some(existing) if existing.matches(&value) => Ok(()),
            Some(_) => Err(Error::InconsistentMeasurement(key.to_string())),
        }
    }

    pub fn get(&self, key: &TcbInfoKey) -> Option<&TcbInfoValue> {
        self.map.get(key)
    }

    pub fn contains(&self, key: &TcbInfoKey) -> bool {
        self.map.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TcbInfoKey, &TcbInfoValue)> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::tcbinfo::FwIdField;

    fn rom_measurement(digest: &str) -> TcbInfo {
        TcbInfo {
            vendor: Some("intel.com".into()),
            layer: Some(0),
            fwid: Some(FwIdField {
                hash_alg: "2.16.840.1.101.3.4.2.2".into(),
                digest: digest.into(),
            }),
            measurement_type: Some("2.16.840.1.113741.1.15.4.2".into()),
            ..TcbInfo::default()
        }
    }

    #[test]
    fn repeated_identical_record_is_idempotent() {
        let mut aggregator = TcbInfoAggregator::new();
        aggregator.add(&rom_measurement("aa")).unwrap();
        aggregator.add(&rom_measurement("aa")).unwrap();
        assert_eq!(aggregator.len(), 1);
    }

    #[test]
    fn conflicting_value_for_one_key_fails() {
        let mut aggregator = TcbInfoAggregator::new();
        aggregator.add(&rom_measurement("aa")).unwrap();
        let err = aggregator.add(&rom_measurement("bb")).unwrap_err();
        assert!(matches!(err, Error::InconsistentMeasurement(_)));
    }

    #[test]
    fn masked_vendor_info_difference_is_tolerated() {
        use crate::dice::tcbinfo::MaskedVendorInfo;

        let mut first = rom_measurement("aa");
        first.vendor_info = Some(MaskedVendorInfo::with_mask("0102", "ff00"));
        let mut second = rom_measurement("aa");
        second.vendor_info = Some(MaskedVendorInfo::new("01ff"));

        let mut aggregator = TcbInfoAggregator::new();
        aggregator.add(&first).unwrap();
        aggregator.add(&second).unwrap();
        assert_eq!(aggregator.len(), 1);
    }

    #[test]
    fn distinct_keys_accumulate() {
        let mut aggregator = TcbInfoAggregator::new();
        aggregator.add(&rom_measurement("aa")).unwrap();
        let mut cmf = rom_measurement("cc");
        cmf.layer = Some(1);
        cmf.measurement_type = Some("2.16.840.1.113741.1.15.4.3".into());
        aggregator.add(&cmf).unwrap();
        assert_eq!(aggregator.len(), 2);
    }
}
