//! Input decoding for `.tja` chart files.
//!
//! TJA files in the wild ship as UTF-8 with BOM, plain UTF-8, or Shift-JIS.
//! The first decoder that yields a string without replacement characters
//! wins, with UTF-8 preferred when both decodings are plausible.

use encoding_rs::{SHIFT_JIS, UTF_8};

use crate::ConvertError;

const UTF_8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Decode raw chart bytes into text, returning the name of the chosen
/// encoding alongside the decoded string.
pub fn decode_chart_bytes(bytes: &[u8]) -> Result<(String, &'static str), ConvertError> {
    if let Some(stripped) = bytes.strip_prefix(UTF_8_BOM) {
        let (text, _, had_errors) = UTF_8.decode(stripped);
        if !had_errors {
            return Ok((text.into_owned(), "UTF-8 (BOM)"));
        }
    }

    let (text, _, had_errors) = UTF_8.decode(bytes);
    if !had_errors {
        return Ok((text.into_owned(), "UTF-8"));
    }

    let (text, _, had_errors) = SHIFT_JIS.decode(bytes);
    if !had_errors {
        return Ok((text.into_owned(), "Shift-JIS"));
    }

    Err(ConvertError::EncodingError(
        "input is neither valid UTF-8 nor valid Shift-JIS".to_string(),
    ))
}

/// Split decoded text into logical chart lines.
///
/// `//` comments run to the end of the line and are stripped; every line is
/// trimmed and blank lines are discarded.
pub fn chart_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(|line| {
            let line = match line.split_once("//") {
                Some((before, _comment)) => before,
                None => line,
            };
            line.trim()
        })
        .filter(|line| !line.is_empty())
        .collect()
}
