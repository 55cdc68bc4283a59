// Copyright (C) Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0
//

use openssl::error::ErrorStack;
use std::{convert::From, error, fmt::Display, io};

/// Error conditions produced while parsing or verifying attestation
/// evidence.
///
/// Parsing and structural errors are never retried: they indicate a
/// malformed or tampered artifact and fail the current attestation
/// session outright. Field-policy outcomes are reported as booleans by
/// the verifiers instead of through this type.
#[derive(Debug)]
pub enum Error {
    /// Malformed binary layout: magic mismatch, inconsistent length
    /// fields or a truncated buffer.
    StructureParse(String),

    /// A TcbInfo FWIDLIST carried more than one FwId entry, which
    /// makes the measurement ambiguous.
    MultipleFwIds,

    /// Cryptographic signature verification could not be performed.
    InvalidSignature,

    /// A structural X.509 chain rule was violated.
    ChainValidation {
        /// The rule that failed.
        rule: &'static str,
        /// The offending value.
        detail: String,
    },

    /// Two certificates in one chain reported different values for the
    /// same measurement identity.
    InconsistentMeasurement(String),

    /// The aggregated chain is missing a mandatory measurement.
    MissingRequiredMeasurement(String),

    /// I/O failure while reading or writing a structure.
    Io(io::Error),

    /// An error bubbled up from the OpenSSL stack.
    Crypto(ErrorStack),

    /// X.509 or ASN.1 decoding failure.
    X509(String),
}

impl Error {
    pub(crate) fn bad_magic(structure: &'static str, expected: u32, actual: u32) -> Self {
        Error::StructureParse(format!(
            "invalid magic in {structure}: expected {expected:#010x}, actual {actual:#010x}"
        ))
    }
}

/// A `Result` specialized for evidence-verification errors.
pub type Result<T> = std::result::Result<T, Error>;

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::StructureParse(detail) => write!(f, "structure parse error: {detail}"),
            Error::MultipleFwIds => write!(f, "TcbInfo contains more than one FwId"),
            Error::InvalidSignature => write!(f, "signature verification failed"),
            Error::ChainValidation { rule, detail } => {
                write!(f, "certificate chain rule '{rule}' violated: {detail}")
            }
            Error::InconsistentMeasurement(key) => {
                write!(f, "conflicting measurement values for {key}")
            }
            Error::MissingRequiredMeasurement(what) => {
                write!(f, "required measurement missing: {what}")
            }
            Error::Io(_) => write!(f, "I/O error"),
            Error::Crypto(_) => write!(f, "OpenSSL error"),
            Error::X509(detail) => write!(f, "X.509 error: {detail}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Crypto(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(error: io::Error) -> Error {
        Error::Io(error)
    }
}

impl From<ErrorStack> for Error {
    #[inline]
    fn from(error: ErrorStack) -> Error {
        Error::Crypto(error)
    }
}

impl From<x509_parser::error::X509Error> for Error {
    #[inline]
    fn from(error: x509_parser::error::X509Error) -> Error {
        Error::X509(error.to_string())
    }
}

impl From<x509_parser::nom::Err<x509_parser::error::X509Error>> for Error {
    #[inline]
    fn from(error: x509_parser::nom::Err<x509_parser::error::X509Error>) -> Error {
        Error::X509(error.to_string())
    }
}
