/*
 * SZip Rust v1.0.0
 * Copyright (c) 2024 Tiash / @MrCarb0n and Earth Inc.
 * Licensed under the MIT License.
 */

use ::pem as pem_crate;
use std::{fs, path::Path};
use x509_parser::prelude::*;

use crate::{crypto::CryptoEngine, error::SzipError, pkcs7::SignedData, ui::Ui, PEM_TAG};

/// Out-of-band SHA-1 pin checked before the signature is verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustPin {
    /// Pins the whole envelope: SHA-1 of the PEM-decoded DER.
    Container(String),
    /// Pins the signer: SHA-1 of the signer certificate DER.
    Signer(String),
}

impl TrustPin {
    pub fn container(fingerprint: &str) -> Result<Self, SzipError> {
        Ok(Self::Container(CryptoEngine::normalize_fingerprint(fingerprint)?))
    }

    pub fn signer(fingerprint: &str) -> Result<Self, SzipError> {
        Ok(Self::Signer(CryptoEngine::normalize_fingerprint(fingerprint)?))
    }

    fn expected(&self) -> &str {
        match self {
            TrustPin::Container(h) | TrustPin::Signer(h) => h,
        }
    }
}

/// Container content whose signature has been verified.
#[derive(Debug)]
pub struct VerifiedContent {
    pub content: Vec<u8>,
    pub signer_subject: String,
    pub signer_fingerprint: String,
    pub container_fingerprint: String,
}

/// Verifies the signed-data envelope of `.szp` containers.
pub struct ArtifactVerifier;

impl ArtifactVerifier {
    pub fn verify(
        path: &Path,
        pin: Option<&TrustPin>,
        ui: &Ui,
    ) -> Result<VerifiedContent, SzipError> {
        ui.verbose(&format!("Loading container: {}", path.display()));
        let raw = fs::read(path).map_err(|e| SzipError::io_at(path, e))?;
        Self::verify_bytes(&raw, pin, ui)
    }

    pub fn verify_bytes(
        raw: &[u8],
        pin: Option<&TrustPin>,
        ui: &Ui,
    ) -> Result<VerifiedContent, SzipError> {
        let pem = pem_crate::parse(raw)?;
        if pem.tag() != PEM_TAG {
            ui.warn(&format!("Unexpected PEM label '{}', expected '{}'", pem.tag(), PEM_TAG));
        }
        let envelope = pem.contents();
        ui.debug(&format!("Envelope: {} bytes DER", envelope.len()));

        let signed = SignedData::parse(envelope)?;

        let container_fingerprint = CryptoEngine::compute_sha1(envelope);
        if let Some(pin @ TrustPin::Container(_)) = pin {
            Self::check_pin(&container_fingerprint, pin, ui)?;
        }

        let signer_der = signed.signer_certificate()?;
        let signer_fingerprint = CryptoEngine::compute_sha1(signer_der);
        let signer_subject = X509Certificate::from_der(signer_der)
            .map(|(_, c)| c.subject().to_string())
            .map_err(|e| SzipError::Trust(format!("invalid signer certificate: {}", e)))?;
        if let Some(pin @ TrustPin::Signer(_)) = pin {
            Self::check_pin(&signer_fingerprint, pin, ui)?;
        }

        ui.debug(&format!(
            "Container SHA-1: {}, signer SHA-1: {}",
            container_fingerprint, signer_fingerprint
        ));

        signed.verify()?;
        ui.verbose(&format!("Signature valid, signed by {}", signer_subject));

        Ok(VerifiedContent {
            content: signed.into_content(),
            signer_subject,
            signer_fingerprint,
            container_fingerprint,
        })
    }

    fn check_pin(actual: &str, pin: &TrustPin, ui: &Ui) -> Result<(), SzipError> {
        if !CryptoEngine::digests_match(actual, pin.expected()) {
            return Err(SzipError::Trust(format!(
                "fingerprint {} does not match the expected {}",
                actual,
                pin.expected()
            )));
        }
        ui.verbose("Fingerprint matches the pinned value");
        Ok(())
    }
}
