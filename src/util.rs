use chrono::prelude::*;

pub fn cvt(r: libc::c_int) -> Result<libc::c_int, openssl::error::ErrorStack> {
    if r <= 0 {
        Err(openssl::error::ErrorStack::get())
    } else {
        Ok(r)
    }
}

/// Parses a `YYMMDDHHMMSSZ` timestamp as found in CA index files.
///
/// The two-digit year is taken as 20xx across the whole range, matching how
/// the databases this responder serves are written: an expiry of
/// `991231235959Z` means 2099, not 1999.
pub fn parse_index_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.len() != 13 || !s.ends_with('Z') || !s[..12].bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let year = 2000 + s[0..2].parse::<i32>().ok()?;
    let month = s[2..4].parse::<u32>().ok()?;
    let day = s[4..6].parse::<u32>().ok()?;
    let hour = s[6..8].parse::<u32>().ok()?;
    let minute = s[8..10].parse::<u32>().ok()?;
    let second = s[10..12].parse::<u32>().ok()?;

    Utc.with_ymd_and_hms(year, month, day, hour, minute, second).single()
}

/// Parses a `YYYYMMDDHHMMSSZ` GeneralizedTime timestamp.
pub fn parse_generalized_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.len() != 15 || !s.ends_with('Z') || !s[..14].bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let year = s[0..4].parse::<i32>().ok()?;
    let month = s[4..6].parse::<u32>().ok()?;
    let day = s[6..8].parse::<u32>().ok()?;
    let hour = s[8..10].parse::<u32>().ok()?;
    let minute = s[10..12].parse::<u32>().ok()?;
    let second = s[12..14].parse::<u32>().ok()?;

    Utc.with_ymd_and_hms(year, month, day, hour, minute, second).single()
}

/// Upper-case hex of a DER INTEGER's content bytes, with any leading zero
/// octets dropped so the result matches the serial column of a CA index file.
pub fn serial_to_hex(serial: &[u8]) -> String {
    let mut bytes = serial;
    while bytes.len() > 1 && bytes[0] == 0 {
        bytes = &bytes[1..];
    }
    hex::encode_upper(bytes)
}

/// Truncates a timestamp to whole seconds, as DER time values carry no
/// fractional part.
pub fn truncate_to_seconds(time: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(time.timestamp(), 0).unwrap()
}
