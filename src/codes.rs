//! IATA airport codes and the compiled-in country table.
//!
//! IATA codes are always exactly three uppercase ASCII letters and are
//! packed into a `u32` (one spare leading byte) for the in-memory
//! representation rather than stored as a heap string; country codes are
//! indices into [`COUNTRIES`].

use crate::error::Error;

/// Two-letter ISO country codes, in the exact order the original
/// implementation's `COUNTRIES` table uses — `destination_country` is an
/// index into this table, so the order is load-bearing, not cosmetic.
pub const COUNTRIES: [&str; 243] = [
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AN", "AO", "AQ", "AR", "AS", "AT", "AU", "AW", "AX",
    "AZ", "BA", "BB", "BD", "BE", "BF", "BG", "BH", "BI", "BJ", "BM", "BN", "BO", "BR", "BS", "BT",
    "BV", "BW", "BY", "BZ", "CA", "CC", "CD", "CF", "CG", "CH", "CI", "CK", "CL", "CM", "CN", "CO",
    "CR", "CS", "CU", "CV", "CX", "CY", "CZ", "DE", "DJ", "DK", "DM", "DO", "DZ", "EC", "EE", "EG",
    "EH", "ER", "ES", "ET", "FI", "FJ", "FK", "FM", "FO", "FR", "GA", "GB", "GD", "GE", "GF", "GG",
    "GH", "GI", "GL", "GM", "GN", "GP", "GQ", "GR", "GS", "GT", "GU", "GW", "GY", "HK", "HM", "HN",
    "HR", "HT", "HU", "ID", "IE", "IL", "IM", "IN", "IO", "IQ", "IR", "IS", "IT", "JE", "JM", "JO",
    "JP", "KE", "KG", "KH", "KI", "KM", "KN", "KP", "KR", "KW", "KY", "KZ", "LA", "LB", "LC", "LI",
    "LK", "LR", "LS", "LT", "LU", "LV", "LY", "MA", "MC", "MD", "MG", "MH", "MK", "ML", "MM", "MN",
    "MO", "MP", "MQ", "MR", "MS", "MT", "MU", "MV", "MW", "MX", "MY", "MZ", "NA", "NC", "NE", "NF",
    "NG", "NI", "NL", "NO", "NP", "NR", "NU", "NZ", "OM", "PA", "PE", "PF", "PG", "PH", "PK", "PL",
    "PM", "PN", "PR", "PS", "PT", "PW", "PY", "QA", "RE", "RO", "RU", "RW", "SA", "SB", "SC", "SD",
    "SE", "SG", "SH", "SI", "SJ", "SK", "SL", "SM", "SN", "SO", "SR", "ST", "SV", "SY", "SZ", "TC",
    "TD", "TF", "TG", "TH", "TJ", "TK", "TL", "TM", "TN", "TO", "TR", "TT", "TV", "TW", "TZ", "UA",
    "UG", "UM", "US", "UY", "UZ", "VA", "VC", "VE", "VG", "VI", "VN", "VU", "WF", "WS", "YE", "YT",
    "ZA", "ZM", "ZW",
];

pub fn country_to_code(country: &str) -> Result<u8, Error> {
    COUNTRIES
        .iter()
        .position(|c| c.eq_ignore_ascii_case(country))
        .map(|i| i as u8)
        .ok_or_else(|| Error::bad_parameter("country", format!("unknown country '{country}'")))
}

pub fn code_to_country(code: u8) -> Result<&'static str, Error> {
    COUNTRIES
        .get(code as usize)
        .copied()
        .ok_or_else(|| Error::bad_parameter("country_code", format!("code {code} out of range")))
}

/// Packs a 3-letter IATA code into a `u32` for compact storage in
/// `DealInfo`. The leading byte is always zero.
pub fn iata_to_code(iata: &str) -> Result<u32, Error> {
    let bytes = iata.as_bytes();
    if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
        return Err(Error::bad_parameter("iata", format!("expected 3 letters, got '{iata}'")));
    }
    let upper: Vec<u8> = bytes.iter().map(|b| b.to_ascii_uppercase()).collect();
    Ok(u32::from_le_bytes([upper[0], upper[1], upper[2], 0]))
}

pub fn code_to_iata(code: u32) -> String {
    let bytes = code.to_le_bytes();
    String::from_utf8_lossy(&bytes[..3]).into_owned()
}
