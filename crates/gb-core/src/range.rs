//! Post-range queries as used by `read.cgi` style paths.
//!
//! | path          | query                         |
//! |---------------|-------------------------------|
//! | `id`          | all posts                     |
//! | `id/n1,n2,n3` | exactly those posts           |
//! | `id/n`        | exactly post `n`              |
//! | `id/l50`      | the last 50 posts             |
//! | `id/s-e`      | posts `s..=e`, either side optional |
//!
//! Parsing never fails; anything unrecognized selects every post.

use crate::dat;
use crate::models::Record;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeQuery {
    All,
    /// Posts whose ordinal is listed; output keeps thread order.
    ExplicitIds(Vec<usize>),
    LastN(usize),
    /// Inclusive bounds; `None` means 1 and the post count respectively.
    FromTo {
        start: Option<usize>,
        end: Option<usize>,
    },
}

impl RangeQuery {
    /// Splits `id[/expr]` into the thread key and its query.
    pub fn parse_path(raw: &str) -> (&str, RangeQuery) {
        match raw.split_once('/') {
            Some((id, expr)) => (id, Self::parse(expr)),
            None => (raw, RangeQuery::All),
        }
    }

    /// Parses the part after the slash.
    pub fn parse(expr: &str) -> RangeQuery {
        let expr = expr.trim().trim_end_matches('/');
        if expr.is_empty() {
            return RangeQuery::All;
        }

        if expr.contains(',') {
            let ids: Vec<usize> = expr
                .split(',')
                .filter_map(|item| parse_number(item.trim()))
                .collect();
            return if ids.is_empty() {
                RangeQuery::All
            } else {
                RangeQuery::ExplicitIds(ids)
            };
        }

        if let Some(count) = expr.strip_prefix(['l', 'L']) {
            return match parse_number(count) {
                Some(0) | None => RangeQuery::All,
                Some(n) => RangeQuery::LastN(n),
            };
        }

        if let Some((start, end)) = expr.split_once('-') {
            let bound = |side: &str| {
                if side.is_empty() {
                    Some(None)
                } else {
                    parse_number(side).map(Some)
                }
            };
            return match (bound(start), bound(end)) {
                (Some(start), Some(end)) => RangeQuery::FromTo { start, end },
                _ => RangeQuery::All,
            };
        }

        match parse_number(expr) {
            Some(id) => RangeQuery::ExplicitIds(vec![id]),
            None => RangeQuery::All,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, RangeQuery::All)
    }

    /// Whether post `ordinal` of a `total`-post thread is selected.
    pub fn contains(&self, ordinal: usize, total: usize) -> bool {
        match self {
            RangeQuery::All => true,
            RangeQuery::ExplicitIds(ids) => ids.contains(&ordinal),
            RangeQuery::LastN(n) => ordinal > total.saturating_sub(*n),
            RangeQuery::FromTo { start, end } => {
                let start = start.unwrap_or(1);
                let end = end.unwrap_or(total);
                start <= ordinal && ordinal <= end
            }
        }
    }

    /// Filters decoded records, keeping thread order.
    pub fn select(&self, records: Vec<Record>) -> Vec<Record> {
        if self.is_all() {
            return records;
        }
        let total = records.len();
        records
            .into_iter()
            .filter(|record| self.contains(record.id, total))
            .collect()
    }

    /// Filters the raw lines of a blob, returning newline-terminated DAT text.
    pub fn slice_dat(&self, blob: &str) -> String {
        let total = dat::count_records(blob);
        dat::lines(blob)
            .enumerate()
            .filter(|(index, _)| self.contains(index + 1, total))
            .fold(String::new(), |mut out, (_, line)| {
                out.push_str(line);
                out.push('\n');
                out
            })
    }
}

fn parse_number(digits: &str) -> Option<usize> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
