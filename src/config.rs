//! Operator configuration.
//!
//! The same record is understood in two places: the responder binary extracts
//! it from rocket's figment under the `varsel` key, and the CLI loads a TOML
//! file directly. `$dir` expands to the directory holding the config file,
//! `$base` to the optional `base_dir` option, and relative paths resolve
//! against the config file's directory.

use std::path::{Path, PathBuf};

use figment::providers::Format;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to read configuration: {0}")]
    Read(#[from] figment::Error),
    #[error("no issuers configured")]
    NoIssuers,
    #[error("issuer index {0} out of range")]
    UnknownIssuer(usize),
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SignatureHash {
    Sha1,
    Sha256,
}

impl SignatureHash {
    pub fn message_digest(self) -> openssl::hash::MessageDigest {
        match self {
            SignatureHash::Sha1 => openssl::hash::MessageDigest::sha1(),
            SignatureHash::Sha256 => openssl::hash::MessageDigest::sha256(),
        }
    }
}

impl std::str::FromStr for SignatureHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha1" => Ok(SignatureHash::Sha1),
            "sha256" => Ok(SignatureHash::Sha256),
            _ => Err(format!("unknown signature hash '{}'", s)),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct RawIssuerConfig {
    pub certificate: String,
    pub key: String,
    #[serde(default)]
    pub chain: Vec<String>,
    pub database: String,
}

#[derive(Deserialize, Debug)]
pub struct RawConfig {
    pub issuers: Vec<RawIssuerConfig>,
    pub base_dir: Option<String>,
    pub max_age: Option<u64>,
    pub ttl_days: Option<i64>,
    pub signature_hash: Option<SignatureHash>,
}

#[derive(Debug, Clone)]
pub struct IssuerConfig {
    pub certificate: PathBuf,
    pub key: PathBuf,
    pub chain: Vec<PathBuf>,
    pub database: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub issuers: Vec<IssuerConfig>,
    pub max_age: Option<u64>,
    pub ttl_days: i64,
    pub signature_hash: SignatureHash,
}

pub const DEFAULT_TTL_DAYS: i64 = 1;

impl RawConfig {
    /// Expands `$dir`/`$base` and anchors relative paths at `config_dir`.
    pub fn resolve(self, config_dir: &Path) -> Result<Config, ConfigError> {
        if self.issuers.is_empty() {
            return Err(ConfigError::NoIssuers);
        }

        let base_dir = self
            .base_dir
            .map(|b| resolve_path(&b, config_dir, None))
            .unwrap_or_else(|| config_dir.to_path_buf());

        let issuers = self
            .issuers
            .into_iter()
            .map(|issuer| IssuerConfig {
                certificate: resolve_path(&issuer.certificate, config_dir, Some(&base_dir)),
                key: resolve_path(&issuer.key, config_dir, Some(&base_dir)),
                chain: issuer
                    .chain
                    .iter()
                    .map(|c| resolve_path(c, config_dir, Some(&base_dir)))
                    .collect(),
                database: resolve_path(&issuer.database, config_dir, Some(&base_dir)),
            })
            .collect();

        Ok(Config {
            issuers,
            max_age: self.max_age,
            ttl_days: self.ttl_days.unwrap_or(DEFAULT_TTL_DAYS),
            signature_hash: self.signature_hash.unwrap_or(SignatureHash::Sha256),
        })
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let raw = figment::Figment::new()
            .merge(figment::providers::Toml::file(path))
            .extract::<RawConfig>()?;
        let config_dir = path.parent().unwrap_or_else(|| Path::new("."));
        raw.resolve(config_dir)
    }

    pub fn issuer(&self, index: usize) -> Result<&IssuerConfig, ConfigError> {
        self.issuers.get(index).ok_or(ConfigError::UnknownIssuer(index))
    }
}

fn resolve_path(value: &str, config_dir: &Path, base_dir: Option<&Path>) -> PathBuf {
    let mut expanded = value.replace("$dir", &config_dir.to_string_lossy());
    if let Some(base) = base_dir {
        expanded = expanded.replace("$base", &base.to_string_lossy());
    }

    let path = PathBuf::from(expanded);
    if path.is_relative() {
        config_dir.join(path)
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load_str(dir: &Path, content: &str) -> Result<Config, ConfigError> {
        let path = dir.join("varsel.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        Config::load(&path)
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_str(
            dir.path(),
            r#"
            [[issuers]]
            certificate = "ca/root.pem"
            key = "ca/root.key"
            database = "ca/index.txt"
            "#,
        )
        .unwrap();

        assert_eq!(config.issuers[0].certificate, dir.path().join("ca/root.pem"));
        assert_eq!(config.issuers[0].database, dir.path().join("ca/index.txt"));
        assert_eq!(config.ttl_days, DEFAULT_TTL_DAYS);
        assert_eq!(config.signature_hash, SignatureHash::Sha256);
        assert_eq!(config.max_age, None);
    }

    #[test]
    fn dir_and_base_interpolation() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_str(
            dir.path(),
            r#"
            base_dir = "$dir/ca"

            [[issuers]]
            certificate = "$base/root.pem"
            key = "$base/root.key"
            database = "$dir/index.txt"
            "#,
        )
        .unwrap();

        assert_eq!(config.issuers[0].certificate, dir.path().join("ca/root.pem"));
        assert_eq!(config.issuers[0].database, dir.path().join("index.txt"));
    }

    #[test]
    fn operator_options_carry_through() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_str(
            dir.path(),
            r#"
            max_age = 3600
            ttl_days = 7
            signature_hash = "sha1"

            [[issuers]]
            certificate = "root.pem"
            key = "root.key"
            database = "index.txt"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_age, Some(3600));
        assert_eq!(config.ttl_days, 7);
        assert_eq!(config.signature_hash, SignatureHash::Sha1);
    }

    #[test]
    fn empty_issuer_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_str(dir.path(), "issuers = []"),
            Err(ConfigError::NoIssuers)
        ));
    }
}
