//! UTF-8 / Shift-JIS bridge for legacy clients.
//!
//! Browsers post UTF-8 forms; dedicated 2ch browsers post Shift-JIS bytes
//! percent-escaped. Internally everything is UTF-8, and the legacy text
//! endpoints answer in Shift-JIS.

use encoding_rs::SHIFT_JIS;
use percent_encoding::percent_decode;
use std::borrow::Cow;

/// `Content-Type` for every legacy text response.
pub const SJIS_TEXT_CONTENT_TYPE: &str = "text/plain; charset=Shift_JIS";
pub const SJIS_HTML_CONTENT_TYPE: &str = "text/html; charset=Shift_JIS";

/// Unescapes one form-encoded component (`+` is a space, `%XX` an escaped
/// byte) without choosing a charset.
pub fn unescape_component(raw: &[u8]) -> Vec<u8> {
    let spaced: Cow<'_, [u8]> = if raw.contains(&b'+') {
        Cow::Owned(
            raw.iter()
                .map(|&b| if b == b'+' { b' ' } else { b })
                .collect(),
        )
    } else {
        Cow::Borrowed(raw)
    };
    percent_decode(&spaced).collect()
}

/// Decodes one form-encoded component on its own.
///
/// The escaped bytes are read as UTF-8 when valid and as Shift-JIS
/// otherwise. Never fails: bytes that are not Shift-JIS either decode to
/// U+FFFD. Whole forms go through [`crate::form::decode_form`], which picks
/// the charset once for every field.
pub fn decode_inbound(raw: &[u8]) -> String {
    let bytes = unescape_component(raw);
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => decode_shift_jis(err.as_bytes()),
    }
}

/// Best-effort Shift-JIS (Windows-31J) decode.
pub fn decode_shift_jis(bytes: &[u8]) -> String {
    let (text, had_errors) = SHIFT_JIS.decode_without_bom_handling(bytes);
    if had_errors {
        tracing::debug!(len = bytes.len(), "replaced undecodable Shift-JIS bytes");
    }
    text.into_owned()
}

/// Serializes text for a legacy response.
///
/// Characters outside Windows-31J are written as HTML numeric character
/// references, which 2ch browsers render.
pub fn encode_outbound(text: &str) -> Vec<u8> {
    let (bytes, _, _) = SHIFT_JIS.encode(text);
    bytes.into_owned()
}
