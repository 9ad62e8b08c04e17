//! Date parsing, the packed `YYYYMMDD` wire form, and weekday derivation.

use crate::error::Error;

/// Parses `YYYY-MM-DD` into the packed `YYYYMMDD` integer form used
/// internally and on the wire for date filters.
pub fn date_to_int(s: &str) -> Result<u32, Error> {
    let bytes = s.as_bytes();
    let valid_shape = bytes.len() == 10 && bytes[4] == b'-' && bytes[7] == b'-';
    if !valid_shape {
        return Err(Error::bad_parameter("date", format!("expected YYYY-MM-DD, got '{s}'")));
    }
    let digits: String = s.chars().filter(|c| *c != '-').collect();
    let value: u32 = digits
        .parse()
        .map_err(|_| Error::bad_parameter("date", format!("expected YYYY-MM-DD, got '{s}'")))?;
    let (year, month, day) = split_yyyymmdd(value);
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) || year == 0 {
        return Err(Error::bad_parameter("date", format!("'{s}' is not a calendar date")));
    }
    Ok(value)
}

/// The inverse of [`date_to_int`]. Rejects `0`, which is used throughout
/// the engine as the "no date set" sentinel rather than a real date.
pub fn int_to_date(value: u32) -> Result<String, Error> {
    if value == 0 {
        return Err(Error::bad_parameter("date", "0 is not a valid date"));
    }
    let (year, month, day) = split_yyyymmdd(value);
    Ok(format!("{year:04}-{month:02}-{day:02}"))
}

fn split_yyyymmdd(value: u32) -> (u32, u32, u32) {
    let year = value / 10_000;
    let month = (value / 100) % 100;
    let day = value % 100;
    (year, month, day)
}

/// Monday = 0 .. Sunday = 6, via a Zeller's-congruence-style table lookup
/// over the month (matching the day-of-week algorithm the original
/// implementation uses, just re-indexed so Monday is bit 0).
pub fn day_of_week(day: u32, month: u32, year: u32) -> u8 {
    const MONTH_TABLE: [i64; 12] = [0, 3, 2, 5, 0, 3, 5, 1, 4, 6, 2, 4];
    let y = if month < 3 { year as i64 - 1 } else { year as i64 };
    let res = (y + y / 4 - y / 100 + y / 400 + MONTH_TABLE[(month - 1) as usize] + day as i64).rem_euclid(7);
    // `res` is Zeller's own Sunday=0..Saturday=6; remap to Monday=0..Sunday=6.
    if res == 0 {
        6
    } else {
        (res - 1) as u8
    }
}

/// The 7-bit weekday bitmask for a packed `YYYYMMDD` date, exactly one
/// bit set.
pub fn weekday_bitmask(date: u32) -> u8 {
    let (year, month, day) = split_yyyymmdd(date);
    1 << day_of_week(day, month, year)
}

const WEEKDAY_NAMES: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

fn day_of_week_from_str(s: &str) -> Result<u8, Error> {
    WEEKDAY_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(s))
        .map(|i| i as u8)
        .ok_or_else(|| Error::bad_parameter("weekday", format!("unknown weekday '{s}'")))
}

/// Parses a comma-separated weekday list (`mon,tue,...`) into a 7-bit
/// bitmask. Rejects an empty list.
pub fn weekdays_bitmask_from_str(csv: &str) -> Result<u8, Error> {
    if csv.trim().is_empty() {
        return Err(Error::bad_parameter("weekdays", "empty weekday list"));
    }
    let mut mask = 0u8;
    for part in csv.split(',') {
        let day = day_of_week_from_str(part.trim())?;
        mask |= 1 << day;
    }
    Ok(mask)
}
