//! Revocation state, as kept in an OpenSSL `ca`-style index file.
//!
//! Each line is a tab-separated record: status flag (`V`/`R`/`E`), expiry
//! (`YYMMDDHHMMSSZ`), revocation field (empty, or `date[,reason[,extra]]`),
//! serial in upper-case hex, certificate filename, and subject DN. Only the
//! first four columns are consulted here.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unable to access CA database: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed CA database line {0}")]
    MalformedLine(usize),
    #[error("malformed CA database record for serial {0}")]
    MalformedRecord(String),
    #[error("serial {0} not present in CA database")]
    UnknownSerial(String),
    #[error("serial {0} is not revoked")]
    NotRevoked(String),
    #[error("serial {0} is already revoked")]
    AlreadyRevoked(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Valid,
    Revoked,
    Expired,
}

impl RecordStatus {
    fn from_flag(flag: &str) -> Option<RecordStatus> {
        match flag {
            "V" => Some(RecordStatus::Valid),
            "R" => Some(RecordStatus::Revoked),
            "E" => Some(RecordStatus::Expired),
            _ => None,
        }
    }

    fn flag(self) -> &'static str {
        match self {
            RecordStatus::Valid => "V",
            RecordStatus::Revoked => "R",
            RecordStatus::Expired => "E",
        }
    }
}

/// One certificate's revocation state, as the status resolver consumes it.
#[derive(Debug, Clone)]
pub struct RevocationRecord {
    pub status: RecordStatus,
    /// Raw `YYMMDDHHMMSSZ` expiry timestamp.
    pub expiry_date: String,
    /// `date[,reason[,extra]]` when revoked, empty otherwise.
    pub revocation_field: String,
}

/// A revoked line decoded for CRL generation.
#[derive(Debug, Clone)]
pub struct RevokedEntry {
    pub serial: Vec<u8>,
    pub serial_hex: String,
    pub revoked_at: DateTime<Utc>,
    pub reason: Option<String>,
    /// Compromise time or hold instruction OID, depending on the reason.
    pub extra: Option<String>,
}

pub trait RevocationStore {
    fn fetch(&self, serial_hex: &str) -> Result<Option<RevocationRecord>, StoreError>;
}

#[derive(Debug, Clone)]
struct IndexLine {
    status: RecordStatus,
    expiry: String,
    revocation: String,
    serial: String,
    rest: Vec<String>,
}

impl IndexLine {
    fn parse(line: &str) -> Option<IndexLine> {
        let mut fields = line.split('\t');
        let status = RecordStatus::from_flag(fields.next()?)?;
        let expiry = fields.next()?.to_string();
        let revocation = fields.next()?.to_string();
        let serial = fields.next()?.to_string();
        Some(IndexLine {
            status,
            expiry,
            revocation,
            serial,
            rest: fields.map(str::to_string).collect(),
        })
    }

    fn render(&self) -> String {
        let mut fields = vec![
            self.status.flag().to_string(),
            self.expiry.clone(),
            self.revocation.clone(),
            self.serial.clone(),
        ];
        fields.extend(self.rest.iter().cloned());
        fields.join("\t")
    }
}

/// File-backed store. Every operation opens the file afresh and releases the
/// handle before returning; reloads by the operator are a whole-file rewrite
/// plus rename, so readers always observe a complete database.
#[derive(Debug, Clone)]
pub struct IndexFileStore {
    path: PathBuf,
}

impl IndexFileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> IndexFileStore {
        IndexFileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_lines(&self) -> Result<Vec<IndexLine>, StoreError> {
        let file = std::fs::File::open(&self.path)?;
        let reader = std::io::BufReader::new(file);

        let mut lines = vec![];
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            lines.push(IndexLine::parse(&line).ok_or(StoreError::MalformedLine(number + 1))?);
        }
        Ok(lines)
    }

    fn write_lines(&self, lines: &[IndexLine]) -> Result<(), StoreError> {
        let mut tmp_path = self.path.clone().into_os_string();
        tmp_path.push(".new");
        let tmp_path = PathBuf::from(tmp_path);

        let mut file = std::fs::File::create(&tmp_path)?;
        for line in lines {
            writeln!(file, "{}", line.render())?;
        }
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Marks a valid certificate revoked at `at`, with an optional reason name.
    pub fn revoke(
        &self,
        serial_hex: &str,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut lines = self.read_lines()?;
        let line = lines
            .iter_mut()
            .find(|l| l.serial.eq_ignore_ascii_case(serial_hex))
            .ok_or_else(|| StoreError::UnknownSerial(serial_hex.to_string()))?;

        if line.status == RecordStatus::Revoked {
            return Err(StoreError::AlreadyRevoked(serial_hex.to_string()));
        }

        line.status = RecordStatus::Revoked;
        line.revocation = match reason {
            Some(reason) => format!("{},{}", format_index_time(at), reason),
            None => format_index_time(at),
        };
        self.write_lines(&lines)
    }

    /// Returns a revoked certificate to the valid state.
    pub fn restore(&self, serial_hex: &str) -> Result<(), StoreError> {
        let mut lines = self.read_lines()?;
        let line = lines
            .iter_mut()
            .find(|l| l.serial.eq_ignore_ascii_case(serial_hex))
            .ok_or_else(|| StoreError::UnknownSerial(serial_hex.to_string()))?;

        if line.status != RecordStatus::Revoked {
            return Err(StoreError::NotRevoked(serial_hex.to_string()));
        }

        line.status = RecordStatus::Valid;
        line.revocation = String::new();
        self.write_lines(&lines)
    }

    /// All revoked lines, decoded for the CRL builder. Lines whose revocation
    /// date does not parse are skipped with a warning rather than poisoning
    /// the whole CRL.
    pub fn revoked_entries(&self) -> Result<Vec<RevokedEntry>, StoreError> {
        let mut entries = vec![];
        for line in self.read_lines()? {
            if line.status != RecordStatus::Revoked {
                continue;
            }

            let mut parts = line.revocation.splitn(3, ',');
            let date = parts.next().unwrap_or("");
            let reason = parts.next().map(str::to_string);
            let extra = parts.next().map(str::to_string);

            let revoked_at = match crate::util::parse_index_time(date) {
                Some(t) => t,
                None => {
                    warn!(
                        "skipping revoked serial {} with unparseable revocation date {:?}",
                        line.serial, date
                    );
                    continue;
                }
            };

            let serial = match decode_serial_hex(&line.serial) {
                Some(s) => s,
                None => {
                    warn!("skipping revoked entry with unparseable serial {:?}", line.serial);
                    continue;
                }
            };

            entries.push(RevokedEntry {
                serial,
                serial_hex: line.serial,
                revoked_at,
                reason,
                extra,
            });
        }
        Ok(entries)
    }
}

impl RevocationStore for IndexFileStore {
    fn fetch(&self, serial_hex: &str) -> Result<Option<RevocationRecord>, StoreError> {
        for line in self.read_lines()? {
            if line.serial.eq_ignore_ascii_case(serial_hex) {
                return Ok(Some(RevocationRecord {
                    status: line.status,
                    expiry_date: line.expiry,
                    revocation_field: line.revocation,
                }));
            }
        }
        Ok(None)
    }
}

pub fn format_index_time(time: DateTime<Utc>) -> String {
    time.format("%y%m%d%H%M%SZ").to_string()
}

fn decode_serial_hex(serial: &str) -> Option<Vec<u8>> {
    let padded = if serial.len() % 2 == 1 {
        format!("0{}", serial)
    } else {
        serial.to_string()
    };
    hex::decode(padded).ok()
}
