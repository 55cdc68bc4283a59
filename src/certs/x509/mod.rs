// Copyright (C) Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0

//! Structural verification of X.509 certificate chains.
//!
//! Newer device generations present standard X.509 DICE chains. This
//! verifier checks the structural rules per adjacent pair — validity
//! window, parent-signs-child, issuer linkage, key identifiers, key
//! usage by position, basic-constraints progression and the critical
//! extension allow-list. Measurement policy lives in [`crate::dice`].

use crate::error::{Error, Result};
use log::warn;
use x509_parser::oid_registry::{
    Oid, OID_PKIX_AUTHORITY_INFO_ACCESS, OID_X509_EXT_AUTHORITY_KEY_IDENTIFIER,
    OID_X509_EXT_BASIC_CONSTRAINTS, OID_X509_EXT_CRL_DISTRIBUTION_POINTS,
    OID_X509_EXT_EXTENDED_KEY_USAGE, OID_X509_EXT_KEY_USAGE, OID_X509_EXT_SUBJECT_KEY_IDENTIFIER,
};
use x509_parser::prelude::*;

/// Structural chain verifier.
///
/// The chain is given leaf first, root last, and must have at least
/// two members. All rules of one pass apply at the time of the call.
#[derive(Debug, Default, Clone)]
pub struct X509ChainVerifier {
    /// Minimum path length required of the root's basic constraints.
    /// When unset, the bound is the chain length minus two.
    pub root_min_path_len: Option<usize>,
    additional_critical: Vec<Oid<'static>>,
}

impl X509ChainVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root_min_path_len(mut self, path_len: usize) -> Self {
        self.root_min_path_len = Some(path_len);
        self
    }

    /// Allows an additional critical extension OID beyond the common
    /// set (basic constraints, key usage, key identifiers).
    pub fn allow_critical_extension(mut self, oid: Oid<'static>) -> Self {
        self.additional_critical.push(oid);
        self
    }

    /// Verifies every structural rule, failing on the first violation
    /// with the rule's name and the offending value.
    pub fn verify(&self, chain: &[X509Certificate]) -> Result<()> {
        if chain.len() < 2 {
            return Err(Error::ChainValidation {
                rule: "chain length",
                detail: format!("{} certificates, at least 2 required", chain.len()),
            });
        }

        let now = ASN1Time::now();
        for (position, cert) in chain.iter().enumerate() {
            self.check_validity(cert, now)?;
            self.check_critical_extensions(cert)?;
            self.check_key_usage(cert, position)?;
            self.check_basic_constraints(cert, position, chain.len())?;
        }

        for pair in chain.windows(2) {
            check_issuer_linkage(&pair[0], &pair[1])?;
            check_key_identifiers(&pair[0], &pair[1])?;
            check_signature(&pair[0], Some(&pair[1]))?;
        }

        // The root terminates the chain by signing itself.
        if let Some(root) = chain.last() {
            check_signature(root, None)?;
        }
        Ok(())
    }

    /// The aggregate outcome as a plain boolean; the violated rule is
    /// logged instead of returned.
    pub fn is_valid(&self, chain: &[X509Certificate]) -> bool {
        match self.verify(chain) {
            Ok(()) => true,
            Err(e) => {
                warn!("X.509 chain verification failed: {e}");
                false
            }
        }
    }

    fn check_validity(&self, cert: &X509Certificate, now: ASN1Time) -> Result<()> {
        if !cert.validity().is_valid_at(now) {
            return Err(Error::ChainValidation {
                rule: "validity window",
                detail: format!(
                    "{}: not before {}, not after {}",
                    cert.subject(),
                    cert.validity().not_before,
                    cert.validity().not_after
                ),
            });
        }
        Ok(())
    }

    fn check_critical_extensions(&self, cert: &X509Certificate) -> Result<()> {
        const COMMON: [&Oid<'static>; 7] = [
            &OID_X509_EXT_BASIC_CONSTRAINTS,
            &OID_X509_EXT_KEY_USAGE,
            &OID_X509_EXT_SUBJECT_KEY_IDENTIFIER,
            &OID_X509_EXT_AUTHORITY_KEY_IDENTIFIER,
            &OID_X509_EXT_EXTENDED_KEY_USAGE,
            &OID_PKIX_AUTHORITY_INFO_ACCESS,
            &OID_X509_EXT_CRL_DISTRIBUTION_POINTS,
        ];

        for ext in cert.extensions().iter().filter(|e| e.critical) {
            let allowed = COMMON.iter().any(|oid| **oid == ext.oid)
                || self.additional_critical.iter().any(|oid| *oid == ext.oid);
            if !allowed {
                return Err(Error::ChainValidation {
                    rule: "critical extension allow-list",
                    detail: ext.oid.to_id_string(),
                });
            }
        }
        Ok(())
    }

    fn check_key_usage(&self, cert: &X509Certificate, position: usize) -> Result<()> {
        let usage = match key_usage(cert)? {
            Some(usage) => usage,
            None => {
                return Err(Error::ChainValidation {
                    rule: "key usage",
                    detail: format!("{}: extension missing", cert.subject()),
                })
            }
        };

        let ok = if position == 0 {
            usage.digital_signature()
        } else {
            usage.key_cert_sign()
        };
        if !ok {
            return Err(Error::ChainValidation {
                rule: "key usage",
                detail: format!(
                    "{}: {} required at chain position {position}",
                    cert.subject(),
                    if position == 0 {
                        "digitalSignature"
                    } else {
                        "keyCertSign"
                    }
                ),
            });
        }
        Ok(())
    }

    fn check_basic_constraints(
        &self,
        cert: &X509Certificate,
        position: usize,
        chain_len: usize,
    ) -> Result<()> {
        let constraints = basic_constraints(cert)?;

        if position == 0 {
            // Leaves may omit the extension; a CA leaf is a violation.
            if constraints.map_or(false, |bc| bc.ca) {
                return Err(Error::ChainValidation {
                    rule: "basic constraints",
                    detail: format!("{}: leaf must not be a CA", cert.subject()),
                });
            }
            return Ok(());
        }

        let constraints = constraints.ok_or_else(|| Error::ChainValidation {
            rule: "basic constraints",
            detail: format!("{}: extension missing on issuer", cert.subject()),
        })?;
        if !constraints.ca {
            return Err(Error::ChainValidation {
                rule: "basic constraints",
                detail: format!("{}: issuer is not a CA", cert.subject()),
            });
        }

        let required = if position == chain_len - 1 {
            self.root_min_path_len.unwrap_or(chain_len.saturating_sub(2))
        } else {
            position - 1
        };
        if let Some(path_len) = constraints.path_len_constraint {
            if (path_len as usize) < required {
                return Err(Error::ChainValidation {
                    rule: "basic constraints",
                    detail: format!(
                        "{}: path length {path_len} below required {required}",
                        cert.subject()
                    ),
                });
            }
        }
        Ok(())
    }
}

fn check_issuer_linkage(child: &X509Certificate, parent: &X509Certificate) -> Result<()> {
    if child.issuer() != parent.subject() {
        return Err(Error::ChainValidation {
            rule: "issuer linkage",
            detail: format!(
                "issuer '{}' does not match parent subject '{}'",
                child.issuer(),
                parent.subject()
            ),
        });
    }
    Ok(())
}

fn check_key_identifiers(child: &X509Certificate, parent: &X509Certificate) -> Result<()> {
    let aki = match authority_key_identifier(child)? {
        Some(keyid) => keyid,
        None => return Ok(()),
    };
    let ski = subject_key_identifier(parent)?.ok_or_else(|| Error::ChainValidation {
        rule: "key identifiers",
        detail: format!("parent '{}' has no subject key identifier", parent.subject()),
    })?;
    if aki != ski {
        return Err(Error::ChainValidation {
            rule: "key identifiers",
            detail: format!(
                "AKI {} does not match parent SKI {}",
                hex::encode(aki.0),
                hex::encode(ski.0)
            ),
        });
    }
    Ok(())
}

fn check_signature(child: &X509Certificate, parent: Option<&X509Certificate>) -> Result<()> {
    let spki = parent.unwrap_or(child).public_key();
    child
        .verify_signature(Some(spki))
        .map_err(|_| Error::ChainValidation {
            rule: "signature",
            detail: format!("'{}' not signed by expected issuer", child.subject()),
        })
}

fn key_usage<'a>(cert: &'a X509Certificate) -> Result<Option<&'a KeyUsage>> {
    match cert.get_extension_unique(&OID_X509_EXT_KEY_USAGE)? {
        Some(ext) => match ext.parsed_extension() {
            ParsedExtension::KeyUsage(usage) => Ok(Some(usage)),
            _ => Err(Error::X509("malformed keyUsage extension".into())),
        },
        None => Ok(None),
    }
}

fn basic_constraints<'a>(cert: &'a X509Certificate) -> Result<Option<&'a BasicConstraints>> {
    match cert.get_extension_unique(&OID_X509_EXT_BASIC_CONSTRAINTS)? {
        Some(ext) => match ext.parsed_extension() {
            ParsedExtension::BasicConstraints(bc) => Ok(Some(bc)),
            _ => Err(Error::X509("malformed basicConstraints extension".into())),
        },
        None => Ok(None),
    }
}

fn subject_key_identifier<'a>(cert: &'a X509Certificate) -> Result<Option<&'a KeyIdentifier<'a>>> {
    match cert.get_extension_unique(&OID_X509_EXT_SUBJECT_KEY_IDENTIFIER)? {
        Some(ext) => match ext.parsed_extension() {
            ParsedExtension::SubjectKeyIdentifier(keyid) => Ok(Some(keyid)),
            _ => Err(Error::X509("malformed subjectKeyIdentifier extension".into())),
        },
        None => Ok(None),
    }
}

fn authority_key_identifier<'a>(
    cert: &'a X509Certificate,
) -> Result<Option<&'a KeyIdentifier<'a>>> {
    match cert.get_extension_unique(&OID_X509_EXT_AUTHORITY_KEY_IDENTIFIER)? {
        Some(ext) => match ext.parsed_extension() {
            ParsedExtension::AuthorityKeyIdentifier(aki) => Ok(aki.key_identifier.as_ref()),
            _ => Err(Error::X509("malformed authorityKeyIdentifier extension".into())),
        },
        None => Ok(None),
    }
}
