/*
 * SZip Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

use crate::{error::SzipError, keys::KeyChain, pkcs7, ui::Ui, PEM_TAG};
use ::pem as pem_crate;

/// Produces the PEM-wrapped signed-data envelope of a container.
pub struct Signer;

impl Signer {
    pub fn sign(payload: &[u8], keys: &KeyChain, ui: &Ui) -> Result<String, SzipError> {
        ui.verbose(&format!("Signing {} byte payload", payload.len()));
        let der = pkcs7::gen_signed_data(keys, payload)?;
        ui.debug(&format!("SignedData: {} bytes DER", der.len()));
        Ok(pem_crate::encode(&pem_crate::Pem::new(PEM_TAG, der)))
    }
}
