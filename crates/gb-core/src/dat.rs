//! # DAT codec
//!
//! One post is one line:
//!
//! ```text
//! name<>mail<>date ID:uid[ BE:be]<>body[<>subject]\n
//! ```
//!
//! Only the first line carries the subject. Decoding is total: degenerate
//! lines become placeholder records instead of failing the thread.

use crate::datetime::parse_dat_date;
use crate::models::{ParsedDat, PostFields, Record};
use std::borrow::Cow;

/// Field separator.
pub const DELIMITER: &str = "<>";
/// Stored in place of a literal `<>` typed by a poster. Not reversed on decode.
pub const DELIMITER_SUBSTITUTE: &str = "＜＞";
/// Inline line-break marker used inside the body field.
pub const LINE_BREAK: &str = "<br>";
pub const ID_MARKER: &str = " ID:";
pub const BE_MARKER: &str = " BE:";
/// Written over name and body of a redacted post.
pub const TOMBSTONE: &str = "あぼーん";
/// Name and uid of a record decoded from a line with fewer than four fields.
pub const PLACEHOLDER: &str = "???";

const MIN_FIELDS: usize = 4;
const SUBJECT_FIELD: usize = 4;

fn escape_delimiter(value: &str) -> Cow<'_, str> {
    if value.contains(DELIMITER) {
        Cow::Owned(value.replace(DELIMITER, DELIMITER_SUBSTITUTE))
    } else {
        Cow::Borrowed(value)
    }
}

/// Single-line fields must not split the record.
fn single_line(value: &str) -> Cow<'_, str> {
    if value.contains(['\r', '\n']) {
        Cow::Owned(value.replace("\r\n", " ").replace(['\r', '\n'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

fn encode_body(body: &str) -> String {
    escape_delimiter(body)
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', LINE_BREAK)
}

fn encode_field(value: &str) -> String {
    single_line(&escape_delimiter(value)).into_owned()
}

/// Encodes one post as a newline-terminated DAT line.
///
/// Pass `subject` only for the first line of a thread.
pub fn encode(fields: &PostFields, subject: Option<&str>) -> String {
    let mut meta = format!("{}{}{}", fields.date, ID_MARKER, fields.uid);
    if let Some(be) = fields.be.as_deref() {
        meta.push_str(BE_MARKER);
        meta.push_str(be);
    }

    let mut parts = vec![
        encode_field(&fields.name),
        encode_field(&fields.mail),
        encode_field(&meta),
        encode_body(&fields.body),
    ];
    if let Some(subject) = subject {
        parts.push(encode_field(subject));
    }

    let mut line = parts.join(DELIMITER);
    line.push('\n');
    line
}

/// Non-blank lines of a blob, in ordinal order.
pub fn lines(dat: &str) -> impl Iterator<Item = &str> {
    dat.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
}

/// Post count without materializing records.
pub fn count_records(dat: &str) -> usize {
    lines(dat).count()
}

/// Subject as shown in listings: the trailing field of the first line.
pub fn subject_of(dat: &str) -> String {
    lines(dat)
        .next()
        .and_then(|first| first.split(DELIMITER).last())
        .unwrap_or_default()
        .to_string()
}

/// Decodes a whole thread blob.
pub fn decode(dat: &str) -> ParsedDat {
    let mut lines = lines(dat).peekable();

    let subject = match lines.peek() {
        Some(first) => {
            let parts: Vec<&str> = first.split(DELIMITER).collect();
            parts
                .get(SUBJECT_FIELD)
                .or_else(|| parts.last())
                .copied()
                .unwrap_or_default()
                .to_string()
        }
        None => return ParsedDat::default(),
    };

    let records = lines
        .enumerate()
        .map(|(index, line)| decode_line(index + 1, line))
        .collect();

    ParsedDat { subject, records }
}

/// Decodes a single line as post number `ordinal`.
pub fn decode_line(ordinal: usize, line: &str) -> Record {
    let parts: Vec<&str> = line.split(DELIMITER).collect();
    if parts.len() < MIN_FIELDS {
        return Record {
            id: ordinal,
            name: PLACEHOLDER.to_string(),
            mail: String::new(),
            date: None,
            raw_date: String::new(),
            uid: PLACEHOLDER.to_string(),
            be: None,
            message: String::new(),
        };
    }

    let meta = split_meta(parts[2]);
    Record {
        id: ordinal,
        name: parts[0].to_string(),
        mail: parts[1].to_string(),
        date: parse_dat_date(meta.date),
        raw_date: meta.date.to_string(),
        uid: meta.uid.unwrap_or_default().to_string(),
        be: meta.be.map(str::to_string),
        message: parts[3].to_string(),
    }
}

struct Meta<'a> {
    date: &'a str,
    uid: Option<&'a str>,
    be: Option<&'a str>,
}

/// Splits `date ID:uid BE:be` at the first occurrence of each marker.
/// Markers are ASCII, so every cut lands on a char boundary.
fn split_meta(meta: &str) -> Meta<'_> {
    let id_at = meta.find(ID_MARKER);
    let be_at = meta.find(BE_MARKER);

    let next_cut = |from: usize| {
        [id_at, be_at]
            .into_iter()
            .flatten()
            .filter(|&at| at >= from)
            .min()
            .unwrap_or(meta.len())
    };
    let segment = |at: Option<usize>, marker: &str| {
        at.map(|at| {
            let start = at + marker.len();
            &meta[start..next_cut(start)]
        })
    };

    Meta {
        date: &meta[..next_cut(0)],
        uid: segment(id_at, ID_MARKER),
        be: segment(be_at, BE_MARKER),
    }
}

/// Result of [`redact_line`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redaction {
    /// No post with that ordinal.
    Missing,
    /// The post exists but has too few fields to rewrite.
    Degenerate,
    /// The rewritten blob.
    Redacted(String),
}

/// Overwrites name and body of post `ordinal` with [`TOMBSTONE`].
///
/// Every other byte of the blob, blank lines included, is preserved.
pub fn redact_line(dat: &str, ordinal: usize) -> Redaction {
    if ordinal == 0 {
        return Redaction::Missing;
    }

    let mut physical: Vec<String> = dat.split('\n').map(str::to_string).collect();
    let target = physical
        .iter()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .nth(ordinal - 1)
        .map(|(index, _)| index);

    let Some(index) = target else {
        return Redaction::Missing;
    };

    let line = &physical[index];
    let (content, cr) = match line.strip_suffix('\r') {
        Some(content) => (content, "\r"),
        None => (line.as_str(), ""),
    };
    let mut parts: Vec<&str> = content.split(DELIMITER).collect();
    if parts.len() < MIN_FIELDS {
        return Redaction::Degenerate;
    }
    parts[0] = TOMBSTONE;
    parts[3] = TOMBSTONE;
    let rewritten = format!("{}{}", parts.join(DELIMITER), cr);

    physical[index] = rewritten;
    Redaction::Redacted(physical.join("\n"))
}

impl Record {
    /// Body split back into logical lines.
    pub fn body_lines(&self) -> Vec<&str> {
        self.message.split(LINE_BREAK).collect()
    }

    /// Body with `<br>` turned back into `\n`.
    pub fn body_text(&self) -> String {
        self.message.replace(LINE_BREAK, "\n")
    }
}
