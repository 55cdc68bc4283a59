// Copyright (C) Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0

//! Matching of aggregated chain measurements against reference
//! evidence supplied by the relying party.

use crate::dice::{TcbInfoAggregator, TcbInfoKey, TcbInfoValue};
use crate::error::Error;
use log::{debug, error};
use serde::{Deserialize, Serialize};

/// Outcome of an evidence comparison.
///
/// `Error` means the comparison itself could not be carried out, as
/// opposed to a measurement that was checked and found wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Ok,
    Fail,
    Error,
}

impl Verdict {
    /// Collapses an evidence-processing result: a completed comparison
    /// keeps its verdict, an internal fault becomes [`Verdict::Error`].
    pub fn from_result(result: crate::Result<Verdict>) -> Verdict {
        match result {
            Ok(verdict) => verdict,
            Err(e) => {
                error!("Evidence verification aborted: {e}");
                Verdict::Error
            }
        }
    }
}

/// One reference measurement: the component identity and the value it
/// is expected to report. Absent value fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcbInfoMeasurement {
    #[serde(flatten)]
    pub key: TcbInfoKey,
    #[serde(flatten)]
    pub value: TcbInfoValue,
}

/// Compares reference measurements against an aggregated chain.
pub struct EvidenceMatcher;

impl EvidenceMatcher {
    /// Every reference measurement must be present in the aggregated
    /// chain with a matching value. An empty reference list passes
    /// trivially.
    pub fn verify(aggregator: &TcbInfoAggregator, reference: &[TcbInfoMeasurement]) -> Verdict {
        for measurement in reference {
            let actual = match aggregator.get(&measurement.key) {
                Some(actual) => actual,
                None => {
                    error!("Chain does not report measurement {}", measurement.key);
                    return Verdict::Fail;
                }
            };
            if !measurement.value.matches(actual) {
                error!("Measurement {} does not match evidence", measurement.key);
                return Verdict::Fail;
            }
            debug!("Measurement {} matches", measurement.key);
        }
        Verdict::Ok
    }

    /// Same comparison, with the reference still in its serialized
    /// form: a JSON array of measurements. A reference that cannot be
    /// parsed yields [`Verdict::Error`], not a panic or a `Fail`.
    pub fn verify_serialized(aggregator: &TcbInfoAggregator, reference: &str) -> Verdict {
        Verdict::from_result(
            serde_json::from_str::<Vec<TcbInfoMeasurement>>(reference)
                .map(|parsed| Self::verify(aggregator, &parsed))
                .map_err(|e| Error::StructureParse(format!("reference measurements: {e}"))),
        )
    }
}
