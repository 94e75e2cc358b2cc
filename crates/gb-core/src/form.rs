//! `bbs.cgi` form decoding.
//!
//! The body is split on raw bytes and every key and value is unescaped.
//! The charset is then chosen once for the whole form: UTF-8 only when every
//! component is valid UTF-8, Shift-JIS otherwise. Deciding per field would
//! misread short Shift-JIS runs that happen to be valid UTF-8.

use crate::encoding::{decode_shift_jis, unescape_component};
use crate::error::{AppError, Result};
use crate::models::ThreadId;
use std::collections::HashMap;

/// Validated-shape form fields of a post submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostForm {
    /// Board key.
    pub bbs: String,
    /// Thread to reply to; `None` opens a new thread.
    pub key: Option<ThreadId>,
    pub from: String,
    pub mail: String,
    pub subject: Option<String>,
    pub message: String,
}

/// Decodes an `application/x-www-form-urlencoded` body into its pairs.
/// Later duplicates win; pairs without `=` are skipped.
pub fn decode_form(body: &[u8]) -> HashMap<String, String> {
    let pairs: Vec<(Vec<u8>, Vec<u8>)> = body
        .split(|&b| b == b'&')
        .filter_map(|pair| {
            let eq = pair.iter().position(|&b| b == b'=')?;
            Some((unescape_component(&pair[..eq]), unescape_component(&pair[eq + 1..])))
        })
        .collect();

    let is_utf8 = |bytes: &[u8]| std::str::from_utf8(bytes).is_ok();
    let utf8 = pairs.iter().all(|(key, value)| is_utf8(key) && is_utf8(value));
    let decode: fn(&[u8]) -> String = if utf8 {
        |bytes| String::from_utf8_lossy(bytes).into_owned()
    } else {
        decode_shift_jis
    };

    pairs
        .into_iter()
        .map(|(key, value)| (decode(&key), decode(&value)))
        .collect()
}

impl PostForm {
    pub fn from_body(body: &[u8]) -> Result<Self> {
        Self::from_pairs(decode_form(body))
    }

    pub fn from_pairs(mut pairs: HashMap<String, String>) -> Result<Self> {
        let bbs = pairs
            .remove("bbs")
            .map(|bbs| bbs.trim().to_string())
            .filter(|bbs| !bbs.is_empty())
            .ok_or_else(|| AppError::validation("missing field: bbs"))?;

        let key = match pairs.remove("key").map(|key| key.trim().to_string()) {
            None => None,
            Some(key) if key.is_empty() => None,
            Some(key) => match key.parse::<ThreadId>() {
                Ok(id) if id > 0 => Some(id),
                _ => return Err(AppError::validation(format!("invalid thread key: {key}"))),
            },
        };

        let message = pairs
            .remove("MESSAGE")
            .filter(|message| !message.is_empty())
            .ok_or_else(|| AppError::validation("missing field: MESSAGE"))?;

        let mut trimmed = |name: &str| {
            pairs
                .remove(name)
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };
        let from = trimmed("FROM");
        let mail = trimmed("mail");
        let subject = Some(trimmed("subject")).filter(|subject| !subject.is_empty());

        Ok(Self {
            bbs,
            key,
            from,
            mail,
            subject,
            message,
        })
    }

    pub fn is_new_thread(&self) -> bool {
        self.key.is_none()
    }
}
