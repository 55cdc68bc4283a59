// Copyright (C) Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0

//! Field-level and chain-level verification of DICE measurements.

use crate::dice::aggregator::TcbInfoAggregator;
use crate::dice::parser::TcbInfoExtractor;
use crate::dice::subject::DiceSubject;
use crate::dice::tcbinfo::{
    MeasurementType, OperationalFlags, TcbInfo, TcbInfoKey, FWID_HASH_ALG_SHA384,
    MEASUREMENT_TYPES_ARC, TRUSTED_VENDOR,
};
use crate::error::{Error, Result};
use log::{debug, error};
use x509_parser::prelude::X509Certificate;

const MAX_SVN: i64 = 31;

/// One rule applied to every TcbInfo found in a chain.
pub trait TcbInfoFieldVerifier {
    fn name(&self) -> &'static str;

    /// Returns true when `info` satisfies the rule.
    fn verify(&self, info: &TcbInfo) -> bool;
}

/// vendor must be present and name the trusted vendor.
pub struct VendorVerifier;

impl TcbInfoFieldVerifier for VendorVerifier {
    fn name(&self) -> &'static str {
        "vendor"
    }

    fn verify(&self, info: &TcbInfo) -> bool {
        info.vendor.as_deref() == Some(TRUSTED_VENDOR)
    }
}

/// model, when present, must name the device family of the chain.
pub struct ModelVerifier {
    family_name: String,
}

impl ModelVerifier {
    pub fn new(family_name: impl Into<String>) -> Self {
        Self {
            family_name: family_name.into(),
        }
    }
}

impl TcbInfoFieldVerifier for ModelVerifier {
    fn name(&self) -> &'static str {
        "model"
    }

    fn verify(&self, info: &TcbInfo) -> bool {
        match &info.model {
            None => true,
            Some(model) => *model == self.family_name,
        }
    }
}

/// layer must be present and non-negative.
pub struct LayerVerifier;

impl TcbInfoFieldVerifier for LayerVerifier {
    fn name(&self) -> &'static str {
        "layer"
    }

    fn verify(&self, info: &TcbInfo) -> bool {
        matches!(info.layer, Some(layer) if layer >= 0)
    }
}

/// svn, when present, must fit the device's monotonic counter.
pub struct SvnVerifier;

impl TcbInfoFieldVerifier for SvnVerifier {
    fn name(&self) -> &'static str {
        "svn"
    }

    fn verify(&self, info: &TcbInfo) -> bool {
        match info.svn {
            None => true,
            Some(svn) => (0..=MAX_SVN).contains(&svn),
        }
    }
}

/// fwid, when present, must be an SHA-384 digest.
pub struct HashAlgVerifier;

impl TcbInfoFieldVerifier for HashAlgVerifier {
    fn name(&self) -> &'static str {
        "hashAlg"
    }

    fn verify(&self, info: &TcbInfo) -> bool {
        match &info.fwid {
            None => true,
            Some(fwid) => fwid.hash_alg == FWID_HASH_ALG_SHA384,
        }
    }
}

/// type, when present, must fall under the measurement-types arc.
pub struct TypeVerifier;

impl TcbInfoFieldVerifier for TypeVerifier {
    fn name(&self) -> &'static str {
        "type"
    }

    fn verify(&self, info: &TcbInfo) -> bool {
        match &info.measurement_type {
            None => true,
            Some(oid) => oid.starts_with(&format!("{MEASUREMENT_TYPES_ARC}.")),
        }
    }
}

/// Operational flags the relying party will tolerate on the CMF
/// measurement. Everything is forbidden unless explicitly permitted.
#[derive(Debug, Clone, Copy)]
pub struct FlagsPolicy {
    pub allowed: OperationalFlags,
}

impl FlagsPolicy {
    pub fn permit(allowed: OperationalFlags) -> Self {
        Self { allowed }
    }
}

impl Default for FlagsPolicy {
    fn default() -> Self {
        Self {
            allowed: OperationalFlags::empty(),
        }
    }
}

/// The CMF record must not raise flags beyond those the policy
/// permits. Other records are outside this rule's scope.
pub struct FlagsVerifier {
    policy: FlagsPolicy,
}

impl FlagsVerifier {
    pub fn new(policy: FlagsPolicy) -> Self {
        Self { policy }
    }

    fn is_cmf(info: &TcbInfo) -> bool {
        match &info.measurement_type {
            Some(oid) => *oid == MeasurementType::Cmf.oid(),
            None => info.layer == Some(MeasurementType::Cmf.layer()),
        }
    }
}

impl TcbInfoFieldVerifier for FlagsVerifier {
    fn name(&self) -> &'static str {
        "flags"
    }

    fn verify(&self, info: &TcbInfo) -> bool {
        let flags = match info.flags {
            None => return true,
            Some(flags) => flags,
        };
        if flags.is_empty() || !Self::is_cmf(info) {
            return true;
        }
        flags.difference(self.policy.allowed).is_empty()
    }
}

/// Checks that the aggregated chain reports both mandatory
/// measurements with an SHA-384 digest, in either key shape.
pub struct RequiredMeasurementsVerifier {
    family_name: String,
}

impl RequiredMeasurementsVerifier {
    pub fn new(family_name: impl Into<String>) -> Self {
        Self {
            family_name: family_name.into(),
        }
    }

    pub fn verify(&self, aggregator: &TcbInfoAggregator) -> Result<()> {
        let rom_present = self.is_present(aggregator, MeasurementType::RomExtension);
        let cmf_present = self.is_present(aggregator, MeasurementType::Cmf);
        if rom_present && cmf_present {
            return Ok(());
        }

        error!(
            "Chain does not contain all required measurements.\n\
             Is Rom extension measurement present: {rom_present}\n\
             Is CMF measurement present: {cmf_present}"
        );
        let missing = match (rom_present, cmf_present) {
            (false, false) => "Rom extension, CMF",
            (false, true) => "Rom extension",
            _ => "CMF",
        };
        Err(Error::MissingRequiredMeasurement(missing.to_string()))
    }

    fn is_present(&self, aggregator: &TcbInfoAggregator, measurement: MeasurementType) -> bool {
        let keys = [
            TcbInfoKey::from_measurement(measurement),
            TcbInfoKey::from_measurement_with_model(measurement, &self.family_name),
        ];
        keys.iter().any(|key| {
            aggregator
                .get(key)
                .and_then(|value| value.fwid.as_ref())
                .map(|fwid| fwid.hash_alg == FWID_HASH_ALG_SHA384)
                .unwrap_or(false)
        })
    }
}

/// Runs every field rule over every TcbInfo of a chain, aggregates the
/// records and checks the mandatory measurements.
pub struct TcbInfoVerifier {
    flags_policy: FlagsPolicy,
    iid_uds_chain: bool,
}

impl TcbInfoVerifier {
    pub fn new() -> Self {
        Self {
            flags_policy: FlagsPolicy::default(),
            iid_uds_chain: false,
        }
    }

    pub fn with_flags_policy(mut self, policy: FlagsPolicy) -> Self {
        self.flags_policy = policy;
        self
    }

    /// IID UDS chains certify an intrinsic-identity key and carry no
    /// firmware measurements, so the mandatory-measurements check is
    /// skipped for them.
    pub fn iid_uds_chain(mut self, iid_uds: bool) -> Self {
        self.iid_uds_chain = iid_uds;
        self
    }

    /// Verifies the chain's measurements, leaf first. Aggregated
    /// records are left in `aggregator` for evidence matching.
    pub fn verify(&self, chain: &[X509Certificate], aggregator: &mut TcbInfoAggregator) -> bool {
        let leaf = match chain.first() {
            Some(leaf) => leaf,
            None => {
                error!("TcbInfo verification called with an empty chain");
                return false;
            }
        };
        let subject = match DiceSubject::from_name(leaf.subject()) {
            Ok(subject) => subject,
            Err(e) => {
                error!("Failed to parse leaf subject: {e}");
                return false;
            }
        };

        let verifiers: Vec<Box<dyn TcbInfoFieldVerifier>> = vec![
            Box::new(VendorVerifier),
            Box::new(ModelVerifier::new(&subject.family_name)),
            Box::new(LayerVerifier),
            Box::new(SvnVerifier),
            Box::new(HashAlgVerifier),
            Box::new(TypeVerifier),
            Box::new(FlagsVerifier::new(self.flags_policy)),
        ];

        for cert in chain {
            let infos = match TcbInfoExtractor::extract(cert) {
                Ok(infos) => infos,
                Err(e) => {
                    error!("Failed to extract TcbInfo: {e}");
                    return false;
                }
            };
            for info in &infos {
                for verifier in &verifiers {
                    if !verifier.verify(info) {
                        error!("TcbInfo field '{}' failed verification", verifier.name());
                        return false;
                    }
                }
                if let Err(e) = aggregator.add(info) {
                    error!("{e}");
                    return false;
                }
            }
        }

        if self.iid_uds_chain {
            debug!("IID UDS chain, skipping required measurements check");
            return true;
        }
        RequiredMeasurementsVerifier::new(&subject.family_name)
            .verify(aggregator)
            .is_ok()
    }
}

impl Default for TcbInfoVerifier {
    fn default() -> Self {
        Self::new()
    }
}
