use std::collections::HashMap;
use std::path::PathBuf;

use base64::prelude::*;
use thiserror::Error;

use super::proto;
use crate::config;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("unable to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unable to parse key material: {0}")]
    Parse(#[from] openssl::error::ErrorStack),
    #[error("unsupported signing key type {0}")]
    UnsupportedKeyType(String),
}

fn read_file(path: &PathBuf) -> Result<Vec<u8>, RegistryError> {
    std::fs::read(path).map_err(|source| RegistryError::Read {
        path: path.clone(),
        source,
    })
}

/// One issuing CA this responder answers for: its certificate, signing key,
/// optional extra chain certificates, and the revocation database path.
pub struct OCSPIssuer {
    pub cert: openssl::x509::X509,
    pub chain: Vec<openssl::x509::X509>,
    pub pkey: openssl::pkey::PKey<openssl::pkey::Private>,
    pub database: PathBuf,
    /// SHA-1 over the subjectPublicKey BIT STRING, doubling as the byKey
    /// responder ID and the registry key.
    pub pub_key_sha1: Vec<u8>,
}

impl std::fmt::Debug for OCSPIssuer {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("OCSPIssuer")
            .field("subject", &self.cert.subject_name())
            .field("database", &self.database)
            .field("key_hash", &hex::encode(&self.pub_key_sha1))
            .finish_non_exhaustive()
    }
}

impl OCSPIssuer {
    pub fn load(config: &config::IssuerConfig) -> Result<OCSPIssuer, RegistryError> {
        let cert = openssl::x509::X509::from_pem(&read_file(&config.certificate)?)?;
        let pkey = openssl::pkey::PKey::private_key_from_pem(&read_file(&config.key)?)?;

        match pkey.id() {
            openssl::pkey::Id::RSA | openssl::pkey::Id::EC => {}
            other => return Err(RegistryError::UnsupportedKeyType(format!("{:?}", other))),
        }

        let chain = config.chain.iter()
            .map(|path| Ok(openssl::x509::X509::from_pem(&read_file(path)?)?))
            .collect::<Result<Vec<_>, RegistryError>>()?;

        let pub_key_sha1 = openssl::hash::hash(
            openssl::hash::MessageDigest::sha1(), &proto::x509_pubkey_bitstr(&cert),
        )?.to_vec();

        Ok(OCSPIssuer {
            cert,
            chain,
            pkey,
            database: config.database.clone(),
            pub_key_sha1,
        })
    }
}

/// Registry of issuers keyed by `base64(issuerKeyHash)`. Built once at
/// startup, read-only afterwards.
#[derive(Debug)]
pub struct OCSPIssuers {
    by_key_hash: HashMap<String, OCSPIssuer>,
}

impl OCSPIssuers {
    pub fn new(issuers: Vec<OCSPIssuer>) -> OCSPIssuers {
        let mut by_key_hash = HashMap::new();
        for issuer in issuers {
            let key = BASE64_STANDARD.encode(&issuer.pub_key_sha1);
            info!("serving OCSP for {:?} under key hash {}", issuer.cert.subject_name(), key);
            if let Some(previous) = by_key_hash.insert(key, issuer) {
                warn!("duplicate issuer key hash, replacing {:?}", previous);
            }
        }
        OCSPIssuers { by_key_hash }
    }

    pub fn load(config: &config::Config) -> Result<OCSPIssuers, RegistryError> {
        let issuers = config.issuers.iter()
            .map(OCSPIssuer::load)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(OCSPIssuers::new(issuers))
    }

    pub fn find_issuer(&self, issuer_key_hash: &[u8]) -> Option<&OCSPIssuer> {
        self.by_key_hash.get(&BASE64_STANDARD.encode(issuer_key_hash))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Self-signed CA with a fresh RSA key, for registry and responder tests.
    pub(crate) fn test_issuer(database: PathBuf) -> OCSPIssuer {
        let rsa = openssl::rsa::Rsa::generate(2048).unwrap();
        let pkey = openssl::pkey::PKey::from_rsa(rsa).unwrap();

        let mut name = openssl::x509::X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "varsel test CA").unwrap();
        let name = name.build();

        let mut builder = openssl::x509::X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&pkey).unwrap();
        builder.set_not_before(&openssl::asn1::Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&openssl::asn1::Asn1Time::days_from_now(365).unwrap()).unwrap();
        builder.set_serial_number(
            &openssl::asn1::Asn1Integer::from_bn(
                &openssl::bn::BigNum::from_u32(1).unwrap(),
            ).unwrap(),
        ).unwrap();
        builder.sign(&pkey, openssl::hash::MessageDigest::sha256()).unwrap();
        let cert = builder.build();

        let pub_key_sha1 = openssl::hash::hash(
            openssl::hash::MessageDigest::sha1(), &proto::x509_pubkey_bitstr(&cert),
        ).unwrap().to_vec();

        OCSPIssuer {
            cert,
            chain: vec![],
            pkey,
            database,
            pub_key_sha1,
        }
    }

    #[test]
    fn lookup_by_key_hash() {
        let issuer = test_issuer(PathBuf::from("/nonexistent"));
        let key_hash = issuer.pub_key_sha1.clone();
        let registry = OCSPIssuers::new(vec![issuer]);

        assert!(registry.find_issuer(&key_hash).is_some());
        assert!(registry.find_issuer(&[0u8; 20]).is_none());
    }
}
