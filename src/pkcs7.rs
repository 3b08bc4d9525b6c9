//! PKCS#7 SignedData encoding and verification.
//!
//! Only the profile produced by [`gen_signed_data`] is supported on the
//! verification side: version 1, one signer, SHA-256 digest, RSA PKCS#1 v1.5
//! signature, content embedded in `encapContentInfo`. The signed attributes
//! carry an ESS `signingCertificateV2` hash that binds the embedded signer
//! certificate to the signature.

use crate::{
    crypto::CryptoEngine,
    error::SzipError,
    keys::{KeyChain, RSA_SIGNATURE_SCHEME, RSA_VERIFICATION_ALGORITHM},
};
use ring::signature::UnparsedPublicKey;
use simple_asn1::{ASN1Block, ASN1Class, BigInt, BigUint, OID};
use x509_parser::prelude::*;

const TAG_SET: u32 = 17;

fn oid_signed_data() -> OID {
    simple_asn1::oid!(1, 2, 840, 113549, 1, 7, 2)
}
fn oid_data() -> OID {
    simple_asn1::oid!(1, 2, 840, 113549, 1, 7, 1)
}
fn oid_sha256() -> OID {
    simple_asn1::oid!(2, 16, 840, 1, 101, 3, 4, 2, 1)
}
fn oid_rsa() -> OID {
    simple_asn1::oid!(1, 2, 840, 113549, 1, 1, 1)
}
fn oid_sha256_with_rsa() -> OID {
    simple_asn1::oid!(1, 2, 840, 113549, 1, 1, 11)
}
fn oid_content_type() -> OID {
    simple_asn1::oid!(1, 2, 840, 113549, 1, 9, 3)
}
fn oid_message_digest() -> OID {
    simple_asn1::oid!(1, 2, 840, 113549, 1, 9, 4)
}
fn oid_signing_certificate_v2() -> OID {
    simple_asn1::oid!(1, 2, 840, 113549, 1, 9, 16, 2, 47)
}

fn algorithm(oid: OID) -> ASN1Block {
    ASN1Block::Sequence(0, vec![ASN1Block::ObjectIdentifier(0, oid), ASN1Block::Null(0)])
}

/// OID of an AlgorithmIdentifier with absent or NULL parameters.
fn algorithm_oid(block: &ASN1Block) -> Option<OID> {
    match block {
        ASN1Block::Sequence(_, fields) => match fields.as_slice() {
            [ASN1Block::ObjectIdentifier(_, oid)]
            | [ASN1Block::ObjectIdentifier(_, oid), ASN1Block::Null(_)] => Some(oid.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// `[n]` IMPLICIT constructed wrapper around already-encoded DER.
fn implicit(tag: u32, body: Vec<u8>) -> ASN1Block {
    ASN1Block::Unknown(ASN1Class::ContextSpecific, true, 0, BigUint::from(tag), body)
}

fn attribute(oid: OID, value: ASN1Block) -> Result<Vec<u8>, SzipError> {
    Ok(simple_asn1::to_der(&ASN1Block::Sequence(
        0,
        vec![ASN1Block::ObjectIdentifier(0, oid), ASN1Block::Set(0, vec![value])],
    ))?)
}

fn fmt_err(msg: &str) -> SzipError {
    SzipError::Format(format!("malformed signed-data structure: {}", msg))
}

fn trust_err(msg: &str) -> SzipError {
    SzipError::Trust(msg.to_string())
}

/// Generates a non-detached PKCS#7 SignedData structure embedding `content`.
pub fn gen_signed_data(keys: &KeyChain, content: &[u8]) -> Result<Vec<u8>, SzipError> {
    let (_, cert) = X509Certificate::from_der(&keys.cert_der)
        .map_err(|e| SzipError::Signing(format!("Failed to parse cert for PKCS7: {}", e)))?;

    let issuer = simple_asn1::from_der(cert.tbs_certificate.issuer.as_raw())
        .map_err(|e| SzipError::Signing(format!("Failed to decode issuer: {}", e)))?
        .into_iter()
        .next()
        .ok_or_else(|| SzipError::Signing("Failed to parse issuer".into()))?;
    let serial = BigInt::from_signed_bytes_be(cert.raw_serial());

    // SigningCertificateV2 { certs: [ESSCertIDv2 { certHash }] }, sha256 by default
    let cert_id = ASN1Block::Sequence(
        0,
        vec![ASN1Block::Sequence(
            0,
            vec![ASN1Block::Sequence(
                0,
                vec![ASN1Block::OctetString(
                    0,
                    CryptoEngine::compute_sha256(&keys.cert_der),
                )],
            )],
        )],
    );

    // Signed attributes, DER-sorted as SET OF requires
    let mut attrs = vec![
        attribute(
            oid_content_type(),
            ASN1Block::ObjectIdentifier(0, oid_data()),
        )?,
        attribute(
            oid_message_digest(),
            ASN1Block::OctetString(0, CryptoEngine::compute_sha256(content)),
        )?,
        attribute(oid_signing_certificate_v2(), cert_id)?,
    ];
    attrs.sort();
    let attrs_body = attrs.concat();

    // The signature covers the attributes re-tagged as a universal SET
    let attrs_der = simple_asn1::to_der(&ASN1Block::Unknown(
        ASN1Class::Universal,
        true,
        0,
        BigUint::from(TAG_SET),
        attrs_body.clone(),
    ))?;

    let key_pair = &keys.private_key;
    let mut signature_bytes = vec![0u8; key_pair.public().modulus_len()];
    let rng = ring::rand::SystemRandom::new();
    key_pair
        .sign(RSA_SIGNATURE_SCHEME, &rng, &attrs_der, &mut signature_bytes)
        .map_err(|_| SzipError::Signing("RSA signing rejected the private key".into()))?;

    let signer_info = ASN1Block::Sequence(
        0,
        vec![
            ASN1Block::Integer(0, BigInt::from(1u32)),
            ASN1Block::Sequence(0, vec![issuer, ASN1Block::Integer(0, serial)]),
            algorithm(oid_sha256()),
            implicit(0, attrs_body),
            algorithm(oid_rsa()),
            ASN1Block::OctetString(0, signature_bytes),
        ],
    );

    let signed_data = ASN1Block::Sequence(
        0,
        vec![
            ASN1Block::Integer(0, BigInt::from(1u32)),
            ASN1Block::Set(0, vec![algorithm(oid_sha256())]),
            ASN1Block::Sequence(
                0,
                vec![
                    ASN1Block::ObjectIdentifier(0, oid_data()),
                    ASN1Block::Explicit(
                        ASN1Class::ContextSpecific,
                        0,
                        BigUint::from(0u32),
                        Box::new(ASN1Block::OctetString(0, content.to_vec())),
                    ),
                ],
            ),
            // certificates, embedded verbatim
            implicit(0, keys.cert_der.clone()),
            ASN1Block::Set(0, vec![signer_info]),
        ],
    );

    let content_info = ASN1Block::Sequence(
        0,
        vec![
            ASN1Block::ObjectIdentifier(0, oid_signed_data()),
            ASN1Block::Explicit(
                ASN1Class::ContextSpecific,
                0,
                BigUint::from(0u32),
                Box::new(signed_data),
            ),
        ],
    );

    simple_asn1::to_der(&content_info)
        .map_err(|e| SzipError::Signing(format!("ASN1 encode error: {}", e)))
}

/// The single SignerInfo of a parsed envelope.
#[derive(Debug, Clone)]
struct SignerInfo {
    version: BigInt,
    issuer_der: Vec<u8>,
    serial: Vec<u8>,
    digest_algorithm: Option<OID>,
    signed_attrs: Option<Vec<u8>>,
    signature_algorithm: Option<OID>,
    signature: Vec<u8>,
}

/// A decoded, not yet verified, SignedData envelope.
#[derive(Debug, Clone)]
pub struct SignedData {
    version: BigInt,
    digest_algorithms: Vec<Option<OID>>,
    content_type: OID,
    content: Vec<u8>,
    certificates: Vec<Vec<u8>>,
    signer: SignerInfo,
}

impl SignedData {
    pub fn parse(der: &[u8]) -> Result<Self, SzipError> {
        let blocks = simple_asn1::from_der(der)?;
        let content_info = match blocks.as_slice() {
            [ASN1Block::Sequence(_, items)] => items,
            _ => return Err(fmt_err("expected a single ContentInfo")),
        };
        let signed_data = match content_info.as_slice() {
            [ASN1Block::ObjectIdentifier(_, oid), wrapped] if *oid == oid_signed_data() => {
                explicit_inner(wrapped)?
            }
            _ => return Err(fmt_err("content type is not signedData")),
        };
        let items = match signed_data {
            ASN1Block::Sequence(_, items) => items,
            _ => return Err(fmt_err("SignedData is not a SEQUENCE")),
        };

        let (version, digest_algorithms) = match items.as_slice() {
            [ASN1Block::Integer(_, v), ASN1Block::Set(_, algs), ..] => {
                (v.clone(), algs.iter().map(algorithm_oid).collect())
            }
            _ => return Err(fmt_err("SignedData version or digestAlgorithms")),
        };

        let mut content = None;
        let mut certificates = Vec::new();
        let mut signer = None;
        for item in items.iter().skip(2) {
            match item {
                ASN1Block::Sequence(_, encap) => content = Some(Self::parse_content(encap)?),
                ASN1Block::Set(_, infos) => {
                    signer = match infos.as_slice() {
                        [ASN1Block::Sequence(_, info)] => Some(Self::parse_signer_info(der, info)?),
                        _ => return Err(fmt_err("expected exactly one SignerInfo")),
                    }
                }
                other if is_context(other, 0) => certificates = certificate_ders(der, other)?,
                // [1] crls are ignored
                other if is_context(other, 1) => {}
                _ => return Err(fmt_err("unexpected SignedData field")),
            }
        }

        let (content_type, content) =
            content.ok_or_else(|| fmt_err("content is detached or missing"))?;
        Ok(Self {
            version,
            digest_algorithms,
            content_type,
            content,
            certificates,
            signer: signer.ok_or_else(|| fmt_err("no SignerInfo"))?,
        })
    }

    fn parse_content(encap: &[ASN1Block]) -> Result<(OID, Vec<u8>), SzipError> {
        match encap {
            [ASN1Block::ObjectIdentifier(_, oid), wrapped] => match explicit_inner(wrapped)? {
                ASN1Block::OctetString(_, bytes) => Ok((oid.clone(), bytes)),
                _ => Err(fmt_err("content is not an OCTET STRING")),
            },
            [ASN1Block::ObjectIdentifier(_, _)] => Err(fmt_err("content is detached")),
            _ => Err(fmt_err("unsupported encapsulated content")),
        }
    }

    fn parse_signer_info(der: &[u8], info: &[ASN1Block]) -> Result<SignerInfo, SzipError> {
        let mut fields = info.iter();
        let version = match fields.next() {
            Some(ASN1Block::Integer(_, v)) => v.clone(),
            _ => return Err(fmt_err("SignerInfo version")),
        };
        let (issuer_der, serial) = match fields.next() {
            Some(ASN1Block::Sequence(_, sid)) => match sid.as_slice() {
                [issuer, ASN1Block::Integer(_, serial)] => {
                    let issuer_der = match tlv_at(der, issuer.offset()) {
                        Some(raw) => raw.to_vec(),
                        None => simple_asn1::to_der(issuer)?,
                    };
                    (issuer_der, serial.to_signed_bytes_be())
                }
                _ => return Err(fmt_err("issuerAndSerialNumber")),
            },
            _ => return Err(fmt_err("signer identifier")),
        };
        let digest_algorithm = match fields.next() {
            Some(block) => algorithm_oid(block),
            None => return Err(fmt_err("digestAlgorithm")),
        };

        let mut next = fields.next();
        let signed_attrs = match next {
            Some(block) if is_context(block, 0) => {
                let body = implicit_body(block)?;
                next = fields.next();
                Some(body)
            }
            _ => None,
        };
        let signature_algorithm = match next {
            Some(block) => algorithm_oid(block),
            None => return Err(fmt_err("signatureAlgorithm")),
        };
        let signature = match fields.next() {
            Some(ASN1Block::OctetString(_, sig)) => sig.clone(),
            _ => return Err(fmt_err("signature")),
        };

        Ok(SignerInfo {
            version,
            issuer_der,
            serial,
            digest_algorithm,
            signed_attrs,
            signature_algorithm,
            signature,
        })
    }

    /// The embedded content. Unauthenticated until [`SignedData::verify`] succeeds.
    pub fn into_content(self) -> Vec<u8> {
        self.content
    }

    /// DER of the certificate named by the SignerInfo.
    pub fn signer_certificate(&self) -> Result<&[u8], SzipError> {
        for der in &self.certificates {
            if let Ok((_, cert)) = X509Certificate::from_der(der) {
                if cert.tbs_certificate.issuer.as_raw() == self.signer.issuer_der.as_slice()
                    && cert.raw_serial() == self.signer.serial.as_slice()
                {
                    return Ok(der.as_slice());
                }
            }
        }
        Err(SzipError::Trust(
            "signer certificate is not embedded in the envelope".into(),
        ))
    }

    /// Verify the signature over the embedded content with the embedded
    /// signer certificate.
    pub fn verify(&self) -> Result<(), SzipError> {
        self.check_profile()?;

        let cert_der = self.signer_certificate()?;
        let (_, cert) = X509Certificate::from_der(cert_der)
            .map_err(|e| SzipError::Trust(format!("invalid signer certificate: {}", e)))?;
        if !cert.validity().is_valid() {
            return Err(SzipError::Trust(format!(
                "signer certificate '{}' is expired or not yet valid",
                cert.subject()
            )));
        }

        let (signed_message, bound) = match &self.signer.signed_attrs {
            Some(body) => {
                let bound = self.check_attributes(body, cert_der)?;
                let message = simple_asn1::to_der(&ASN1Block::Unknown(
                    ASN1Class::Universal,
                    true,
                    0,
                    BigUint::from(TAG_SET),
                    body.clone(),
                ))?;
                (message, bound)
            }
            None => (self.content.clone(), false),
        };
        self.check_certificate(&cert, bound)?;

        let public_key = UnparsedPublicKey::new(
            RSA_VERIFICATION_ALGORITHM,
            cert.public_key().subject_public_key.data.as_ref(),
        );
        public_key
            .verify(&signed_message, &self.signer.signature)
            .map_err(|_| SzipError::Trust("signature verification failed".into()))
    }

    /// The unsigned envelope fields must match the supported profile exactly.
    fn check_profile(&self) -> Result<(), SzipError> {
        let sha256 = Some(oid_sha256());
        if self.version != BigInt::from(1u32) {
            return Err(trust_err("unsupported SignedData version"));
        }
        if self.digest_algorithms.is_empty() || self.digest_algorithms.iter().any(|a| *a != sha256)
        {
            return Err(trust_err("unsupported digest algorithm set"));
        }
        if self.content_type != oid_data() {
            return Err(trust_err("embedded content type is not data"));
        }
        if self.signer.version != BigInt::from(1u32) {
            return Err(trust_err("unsupported SignerInfo version"));
        }
        if self.signer.digest_algorithm != sha256 {
            return Err(trust_err("unsupported digest algorithm"));
        }
        match &self.signer.signature_algorithm {
            Some(oid) if *oid == oid_rsa() || *oid == oid_sha256_with_rsa() => Ok(()),
            _ => Err(trust_err("unsupported signature algorithm")),
        }
    }

    /// The signer certificate must carry a valid signature from itself or
    /// from an embedded issuer. A certificate whose issuer is not embedded is
    /// accepted only when the signed attributes already bind its bytes.
    fn check_certificate(&self, cert: &X509Certificate<'_>, bound: bool) -> Result<(), SzipError> {
        let invalid = |e: X509Error| {
            SzipError::Trust(format!("signer certificate signature is invalid: {}", e))
        };
        if cert.issuer().as_raw() == cert.subject().as_raw() {
            return cert.verify_signature(None).map_err(invalid);
        }
        for der in &self.certificates {
            if let Ok((_, issuer)) = X509Certificate::from_der(der) {
                if issuer.subject().as_raw() == cert.issuer().as_raw() {
                    return cert
                        .verify_signature(Some(issuer.public_key()))
                        .map_err(invalid);
                }
            }
        }
        if bound {
            Ok(())
        } else {
            Err(trust_err("issuer of the signer certificate is not embedded"))
        }
    }

    /// Checks the signed attributes; returns whether they bind the signer
    /// certificate through `signingCertificateV2`.
    fn check_attributes(&self, body: &[u8], cert_der: &[u8]) -> Result<bool, SzipError> {
        let mut content_type_ok = false;
        let mut digest = None;
        let mut cert_hash = None;
        for attr in simple_asn1::from_der(body)? {
            let (oid, values) = match attr {
                ASN1Block::Sequence(_, fields) => match fields.as_slice() {
                    [ASN1Block::ObjectIdentifier(_, oid), ASN1Block::Set(_, values)] => {
                        (oid.clone(), values.clone())
                    }
                    _ => return Err(fmt_err("signed attribute")),
                },
                _ => return Err(fmt_err("signed attribute")),
            };
            if oid == oid_content_type() {
                content_type_ok = matches!(
                    values.as_slice(),
                    [ASN1Block::ObjectIdentifier(_, t)] if *t == oid_data()
                );
            } else if oid == oid_message_digest() {
                if let [ASN1Block::OctetString(_, d)] = values.as_slice() {
                    digest = Some(d.clone());
                }
            } else if oid == oid_signing_certificate_v2() {
                cert_hash = Some(
                    signing_certificate_hash(&values)
                        .ok_or_else(|| trust_err("malformed signing certificate attribute"))?,
                );
            }
        }

        if !content_type_ok {
            return Err(SzipError::Trust("content type attribute mismatch".into()));
        }
        match digest {
            Some(d) if d == CryptoEngine::compute_sha256(&self.content) => {}
            Some(_) => {
                return Err(SzipError::Trust(
                    "message digest does not match the embedded content".into(),
                ))
            }
            None => return Err(SzipError::Trust("message digest attribute missing".into())),
        }
        match cert_hash {
            Some(h) if h == CryptoEngine::compute_sha256(cert_der) => Ok(true),
            Some(_) => Err(trust_err(
                "signer certificate does not match the signed certificate hash",
            )),
            None => Ok(false),
        }
    }
}

/// certHash of the first ESSCertIDv2; only SHA-256 hashes are accepted.
fn signing_certificate_hash(values: &[ASN1Block]) -> Option<Vec<u8>> {
    let certs = match values {
        [ASN1Block::Sequence(_, fields)] => match fields.first()? {
            ASN1Block::Sequence(_, certs) => certs,
            _ => return None,
        },
        _ => return None,
    };
    match certs.first()? {
        ASN1Block::Sequence(_, id) => match id.as_slice() {
            [ASN1Block::OctetString(_, hash), ..] => Some(hash.clone()),
            [alg, ASN1Block::OctetString(_, hash), ..]
                if algorithm_oid(alg) == Some(oid_sha256()) =>
            {
                Some(hash.clone())
            }
            _ => None,
        },
        _ => None,
    }
}

fn is_context(block: &ASN1Block, tag: u32) -> bool {
    match block {
        ASN1Block::Explicit(ASN1Class::ContextSpecific, _, t, _)
        | ASN1Block::Unknown(ASN1Class::ContextSpecific, true, _, t, _) => {
            *t == BigUint::from(tag)
        }
        _ => false,
    }
}

/// Contents of an EXPLICIT context tag.
///
/// The decoder reports a constructed context tag holding exactly one element
/// as `Explicit`, anything else as `Unknown` with the raw body.
fn explicit_inner(block: &ASN1Block) -> Result<ASN1Block, SzipError> {
    match block {
        ASN1Block::Explicit(ASN1Class::ContextSpecific, _, _, inner) => Ok((**inner).clone()),
        ASN1Block::Unknown(ASN1Class::ContextSpecific, true, _, _, body) => {
            let mut inner = simple_asn1::from_der(body)?;
            if inner.len() != 1 {
                return Err(fmt_err("explicit tag must wrap one element"));
            }
            Ok(inner.remove(0))
        }
        _ => Err(fmt_err("expected a context-specific tag")),
    }
}

/// Raw DER body of an IMPLICIT constructed context tag.
fn implicit_body(block: &ASN1Block) -> Result<Vec<u8>, SzipError> {
    match block {
        ASN1Block::Unknown(ASN1Class::ContextSpecific, true, _, _, body) => Ok(body.clone()),
        ASN1Block::Explicit(ASN1Class::ContextSpecific, _, _, inner) => {
            Ok(simple_asn1::to_der(inner)?)
        }
        _ => Err(fmt_err("expected a context-specific tag")),
    }
}

/// The complete single-byte-tag TLV starting at `offset`.
fn tlv_at(der: &[u8], offset: usize) -> Option<&[u8]> {
    let tail = der.get(offset..)?;
    let first = *tail.get(1)? as usize;
    let (header, len) = if first < 0x80 {
        (2, first)
    } else {
        let n = first & 0x7f;
        if n == 0 || n > 4 {
            return None;
        }
        let len = tail
            .get(2..2 + n)?
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | *b as usize);
        (2 + n, len)
    };
    tail.get(..header.checked_add(len)?)
}

/// Certificates of the `[0]` field, as the exact bytes embedded in `der`.
fn certificate_ders(der: &[u8], block: &ASN1Block) -> Result<Vec<Vec<u8>>, SzipError> {
    match block {
        ASN1Block::Explicit(_, _, _, inner) => {
            let tail = der
                .get(inner.offset()..)
                .ok_or_else(|| fmt_err("certificate offset out of range"))?;
            match X509Certificate::from_der(tail) {
                Ok((rest, _)) => Ok(vec![tail[..tail.len() - rest.len()].to_vec()]),
                Err(_) => split_certificates(&simple_asn1::to_der(inner)?),
            }
        }
        other => split_certificates(&implicit_body(other)?),
    }
}

fn split_certificates(mut body: &[u8]) -> Result<Vec<Vec<u8>>, SzipError> {
    let mut certs = Vec::new();
    while !body.is_empty() {
        let (rest, _) = X509Certificate::from_der(body)
            .map_err(|e| SzipError::Format(format!("embedded certificate: {}", e)))?;
        let used = body.len() - rest.len();
        certs.push(body[..used].to_vec());
        body = rest;
    }
    Ok(certs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, ui::Ui};

    fn signed() -> SignedData {
        let keys = KeyChain::from_bytes(
            include_bytes!("../tests/fixtures/signer.crt"),
            include_bytes!("../tests/fixtures/signer.key"),
            &Ui::silent(),
        )
        .unwrap();
        let der = gen_signed_data(&keys, b"payload").unwrap();
        SignedData::parse(&der).unwrap()
    }

    fn assert_trust(data: &SignedData) {
        assert_eq!(data.verify().unwrap_err().kind(), ErrorKind::Trust);
    }

    #[test]
    fn test_generated_envelope_verifies() {
        let data = signed();
        data.verify().unwrap();
        assert_eq!(data.into_content(), b"payload");
    }

    #[test]
    fn test_profile_fields_are_enforced() {
        let mut data = signed();
        data.version = BigInt::from(3u32);
        assert_trust(&data);

        let mut data = signed();
        data.digest_algorithms = vec![None];
        assert_trust(&data);

        let mut data = signed();
        data.content_type = oid_signed_data();
        assert_trust(&data);

        let mut data = signed();
        data.signer.version = BigInt::from(2u32);
        assert_trust(&data);

        let mut data = signed();
        data.signer.digest_algorithm = Some(oid_rsa());
        assert_trust(&data);

        let mut data = signed();
        data.signer.signature_algorithm = Some(oid_sha256());
        assert_trust(&data);
    }

    #[test]
    fn test_certificate_bytes_are_bound() {
        let mut data = signed();
        let last = data.certificates[0].len() - 1;
        data.certificates[0][last] ^= 0x01;
        assert_trust(&data);
    }

    #[test]
    fn test_sha256_with_rsa_signature_algorithm_accepted() {
        let mut data = signed();
        data.signer.signature_algorithm = Some(oid_sha256_with_rsa());
        data.verify().unwrap();
    }

    #[test]
    fn test_tlv_at_reads_long_lengths() {
        let mut der = vec![0x30, 0x81, 0x80];
        der.extend(std::iter::repeat(0u8).take(0x80));
        der.push(0xff);
        assert_eq!(tlv_at(&der, 0).unwrap().len(), 3 + 0x80);
        assert!(tlv_at(&der[..10], 0).is_none());
    }
}
