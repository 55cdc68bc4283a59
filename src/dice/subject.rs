// Copyright (C) Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0

//! DICE certificate subject parsing.
//!
//! Device certificates encode their identity in the CommonName as five
//! colon-delimited components, e.g.
//! `CN=Intel:Agilex:L0:5Uc0S1:0123456789abcdef`.

use crate::error::{Error, Result};
use x509_parser::prelude::X509Name;

const COMPONENTS_COUNT: usize = 5;
const DELIMITER: char = ':';

/// The parsed subject of a DICE certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiceSubject {
    pub company_name: String,
    pub family_name: String,
    pub level: String,
    /// SVN for enrollment certificates, SKI for deviceId and IID UDS
    /// certificates.
    pub additional_data: String,
    pub device_id: String,
}

impl DiceSubject {
    /// Parses the CommonName of `name`.
    pub fn from_name(name: &X509Name) -> Result<Self> {
        let cn = name
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .ok_or_else(|| Error::X509("subject doesn't contain a valid CommonName".into()))?;
        Self::parse(cn)
    }

    /// Parses a raw CommonName value.
    pub fn parse(common_name: &str) -> Result<Self> {
        let components: Vec<&str> = common_name.split(DELIMITER).collect();
        if components.len() != COMPONENTS_COUNT {
            return Err(Error::X509(format!(
                "incorrect subject format - '{common_name}' doesn't consist of exactly \
                 {COMPONENTS_COUNT} parts delimited with '{DELIMITER}'"
            )));
        }

        Ok(Self {
            company_name: components[0].to_string(),
            family_name: components[1].to_string(),
            level: components[2].to_string(),
            additional_data: components[3].to_string(),
            device_id: components[4].to_string(),
        })
    }
}
