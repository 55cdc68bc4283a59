// Copyright (C) Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

//! Remote-attestation evidence verification for FPGA devices.
//!
//! The crate decides whether a device's certificate chain and reported
//! firmware/hardware measurements are authentic, internally consistent
//! and equal to a golden reference before the caller grants trust:
//!
//! * [`certs::psg`] — codec for the proprietary binary certificate
//!   format used by older device generations, chain assembly from raw
//!   device blobs and chain-of-trust signature verification.
//! * [`certs::x509`] — structural verification of standard X.509
//!   certificate chains.
//! * [`dice`] — extraction, aggregation and policy verification of
//!   DICE TcbInfo measurement records carried in certificate
//!   extensions.
//! * [`evidence`] — the final comparison of verified measurements
//!   against a reference, yielding the attestation verdict.
//!
//! Transport to the physical device, SPDM, caching and process entry
//! points are external collaborators; this crate only consumes byte
//! buffers they have already retrieved.

/// Certificate parsing and chain verification.
pub mod certs;

/// DICE TcbInfo extraction, aggregation and policy verification.
pub mod dice;

/// Error module.
pub mod error;

/// Evidence comparison and the attestation verdict.
pub mod evidence;

mod util;

pub use error::{Error, Result};
