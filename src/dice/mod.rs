// Copyright (C) Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0

//! DICE TcbInfo measurement handling.
//!
//! Certificates in a device chain carry firmware and hardware
//! measurements in the TCG DICE TcbInfo extension. This module parses
//! the extension, merges records from every certificate of a chain
//! into one consistency-checked map and runs the field policies the
//! attestation verdict depends on.

pub mod aggregator;
pub mod parser;
pub mod subject;
pub mod tcbinfo;
pub mod verify;

pub use aggregator::TcbInfoAggregator;
pub use parser::TcbInfoExtractor;
pub use subject::DiceSubject;
pub use tcbinfo::{
    FwIdField, MaskedVendorInfo, MeasurementType, OperationalFlags, TcbInfo, TcbInfoKey,
    TcbInfoValue,
};
pub use verify::{FlagsPolicy, RequiredMeasurementsVerifier, TcbInfoFieldVerifier, TcbInfoVerifier};
