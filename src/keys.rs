// SZip Rust - Signed, tamper-evident directory containers
// Copyright (C) 2025 Tiash H Kabir / @MrCarb0n
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::{crypto::CryptoEngine, error::SzipError, ui::Ui};
use ::pem as pem_crate;
use ring::signature::{self, KeyPair, RsaKeyPair};
use std::{fs, path::Path};
use x509_parser::prelude::*;

pub const RSA_SIGNATURE_SCHEME: &dyn signature::RsaEncoding = &signature::RSA_PKCS1_SHA256;

pub const RSA_VERIFICATION_ALGORITHM: &'static dyn signature::VerificationAlgorithm =
    &signature::RSA_PKCS1_2048_8192_SHA256;

/// Certificate and matching private key of the single container signer.
pub struct KeyChain {
    pub private_key: RsaKeyPair,
    pub cert_der: Vec<u8>, // DER encoded certificate data
}

impl KeyChain {
    /// Load the signer certificate and private key from files.
    pub fn load(cert_path: &Path, key_path: &Path, ui: &Ui) -> Result<Self, SzipError> {
        Self::check_key_permissions(key_path, ui)?;
        let cert = fs::read(cert_path).map_err(|e| SzipError::io_at(cert_path, e))?;
        let key = fs::read(key_path).map_err(|e| SzipError::io_at(key_path, e))?;
        let keys = Self::from_bytes(&cert, &key, ui)?;
        ui.verbose(&format!("Signer: {}", keys.subject()));
        Ok(keys)
    }

    /// Build a key chain from in-memory certificate and key material.
    /// Both PEM and raw DER inputs are accepted.
    pub fn from_bytes(cert: &[u8], key: &[u8], ui: &Ui) -> Result<Self, SzipError> {
        let cert_der = Self::parse_certificate(cert, ui)?;
        let private_key = Self::parse_private_key(key, ui)?;

        let (_, parsed) = X509Certificate::from_der(&cert_der)
            .map_err(|e| SzipError::Signing(format!("Invalid certificate: {}", e)))?;
        if parsed.public_key().subject_public_key.data.as_ref()
            != private_key.public_key().as_ref()
        {
            return Err(SzipError::Signing(
                "Private key does not match the certificate public key".into(),
            ));
        }

        Ok(Self {
            private_key,
            cert_der,
        })
    }

    fn parse_private_key(content: &[u8], ui: &Ui) -> Result<RsaKeyPair, SzipError> {
        match pem_crate::parse(content) {
            Ok(pem) if pem.tag() == "RSA PRIVATE KEY" => RsaKeyPair::from_der(pem.contents())
                .map_err(|e| SzipError::Signing(format!("Invalid PKCS#1 private key: {}", e))),
            Ok(pem) => RsaKeyPair::from_pkcs8(pem.contents())
                .map_err(|e| SzipError::Signing(format!("Invalid PEM private key: {}", e))),
            Err(_) => {
                ui.debug("Key is not PEM, attempting to parse as binary PK8/DER...");
                RsaKeyPair::from_pkcs8(content)
                    .or_else(|_| RsaKeyPair::from_der(content))
                    .map_err(|e| SzipError::Signing(format!("Invalid private key format: {}", e)))
            }
        }
    }

    fn parse_certificate(content: &[u8], ui: &Ui) -> Result<Vec<u8>, SzipError> {
        let cert_der = match pem_crate::parse(content) {
            Ok(pem) => pem.contents().to_vec(),
            Err(_) => {
                ui.debug("Certificate is not PEM, attempting to parse as binary X.509 DER...");
                content.to_vec()
            }
        };

        let (_, cert) = X509Certificate::from_der(&cert_der)
            .map_err(|e| SzipError::Signing(format!("Invalid certificate: {}", e)))?;
        if !cert.validity().is_valid() {
            ui.warn(&format!(
                "Certificate '{}' is outside its validity period; containers will not verify.",
                cert.subject()
            ));
        }
        Ok(cert_der)
    }

    pub fn subject(&self) -> String {
        X509Certificate::from_der(&self.cert_der)
            .map(|(_, c)| c.subject().to_string())
            .unwrap_or_default()
    }

    /// SHA-1 of the certificate DER, usable as a signer pin.
    pub fn fingerprint(&self) -> String {
        CryptoEngine::compute_sha1(&self.cert_der)
    }

    #[cfg(unix)]
    fn check_key_permissions(path: &Path, ui: &Ui) -> Result<(), SzipError> {
        use std::os::unix::fs::PermissionsExt;
        let metadata = fs::metadata(path).map_err(|e| SzipError::io_at(path, e))?;
        let permissions = metadata.permissions().mode();
        if permissions & 0o077 != 0 {
            ui.warn(&format!(
                "Private key '{}' is accessible by others (mode {:o}).",
                path.display(),
                permissions
            ));
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn check_key_permissions(_path: &Path, _ui: &Ui) -> Result<(), SzipError> {
        Ok(())
    }
}
