// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Kenyan phone number normalization.
//!
//! Safaricom expects MSISDNs in the 12-digit international form
//! (`2547XXXXXXXX` / `2541XXXXXXXX`). Visitors type numbers in whatever form
//! they are used to, so the raw input is reduced to digits and rewritten to
//! that form where the shape is recognisable.

/// Country calling code for Kenya.
const COUNTRY_CODE: &str = "254";

/// Normalize a user-supplied phone number to the `254XXXXXXXXX` form.
///
/// The function is total: unrecognised input comes back with only its
/// non-digit characters removed, and the payments backend is left to reject
/// it.
///
/// ```rust,ignore
/// assert_eq!(normalize_phone("0712 345 678"), "254712345678");
/// assert_eq!(normalize_phone("+254712345678"), "254712345678");
/// ```
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    if digits.starts_with(COUNTRY_CODE) && digits.len() == 12 {
        return digits;
    }

    if (digits.starts_with("07") || digits.starts_with("01"))
        && (digits.len() == 9 || digits.len() == 10)
    {
        return format!("{COUNTRY_CODE}{}", &digits[1..]);
    }

    if digits.starts_with(COUNTRY_CODE) && digits.len() == 13 {
        return digits[1..].to_string();
    }

    digits
}

/// Whether `msisdn` looks like a normalized Kenyan mobile number.
pub fn is_valid_msisdn(msisdn: &str) -> bool {
    msisdn.len() == 12
        && msisdn.chars().all(|c| c.is_ascii_digit())
        && (msisdn.starts_with("2547") || msisdn.starts_with("2541"))
}
