// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Time broadcast sentences.
//!
//! Only the time and date fields carry information. Position is fixed at
//! 0N 0E, speed and course are zero, and the mode field marks the fix as
//! simulated.

use chrono::{Datelike, Timelike};

/// XOR of every byte in `body`.
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0, |acc, b| acc ^ b)
}

/// Frame `body` as `$<body>*<XX>\r\n`.
pub fn frame(body: &str) -> String {
    format!("${}*{:02X}\r\n", body, checksum(body))
}

/// Recommended-minimum record for the given local time.
pub fn gprmc_body<T: Datelike + Timelike>(time: &T) -> String {
    format!(
        "GPRMC,{:02}{:02}{:02},A,0000.000,N,00000.000,E,000.0,000.0,{:02}{:02}{:02},000.0,W,S",
        time.hour(),
        time.minute(),
        time.second(),
        time.day(),
        time.month(),
        time.year().rem_euclid(100),
    )
}

/// Complete framed time sentence.
pub fn time_sentence<T: Datelike + Timelike>(time: &T) -> String {
    frame(&gprmc_body(time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const NOON_NEW_YEAR: &str =
        "GPRMC,120000,A,0000.000,N,00000.000,E,000.0,000.0,010124,000.0,W,S";

    #[test]
    fn test_checksum_regression() {
        assert_eq!(checksum(NOON_NEW_YEAR), 0x1E);
        assert_eq!(checksum(NOON_NEW_YEAR), checksum(NOON_NEW_YEAR));
    }

    #[test]
    fn test_checksum_empty() {
        assert_eq!(checksum(""), 0);
    }

    #[test]
    fn test_frame() {
        assert_eq!(frame(NOON_NEW_YEAR), format!("${}*1E\r\n", NOON_NEW_YEAR));
        assert_eq!(frame("A"), "$A*41\r\n");
    }

    #[test]
    fn test_gprmc_body_fields() {
        let t = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(gprmc_body(&t), NOON_NEW_YEAR);
    }

    #[test]
    fn test_time_sentence_zero_pads() {
        let t = NaiveDate::from_ymd_opt(2009, 3, 7)
            .unwrap()
            .and_hms_opt(4, 5, 6)
            .unwrap();
        let sentence = time_sentence(&t);
        assert!(sentence.starts_with("$GPRMC,040506,A,"));
        assert!(sentence.contains(",070309,"));
        assert!(sentence.ends_with("\r\n"));
        assert_eq!(sentence.len(), 1 + NOON_NEW_YEAR.len() + 3 + 2);
    }
}
