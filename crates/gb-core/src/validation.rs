//! Pre-write checks for inbound posts. Nothing is persisted unless these pass.

use crate::board::BoardLimits;
use crate::error::{AppError, Result};
use crate::form::PostForm;

/// Longest allowed run of one repeated character.
pub const MAX_REPEAT_RUN: usize = 20;
/// Most `http://` / `https://` occurrences allowed in a body.
pub const MAX_URLS: usize = 10;

/// Checks a decoded form against the board limits and the banned-word list.
pub fn validate_post(form: &PostForm, limits: &BoardLimits, banned_words: &[String]) -> Result<()> {
    check_length("name", &form.from, limits.name)?;
    check_length("mail", &form.mail, limits.mail)?;
    check_length("message", &form.message, limits.message)?;

    match (&form.key, form.subject.as_deref()) {
        (None, None) | (None, Some("")) => {
            return Err(AppError::validation("スレッドタイトルを入力してください"));
        }
        (_, Some(subject)) => check_length("subject", subject, limits.subject)?,
        _ => {}
    }

    validate_message(&form.message, banned_words)
}

/// Body rules shared by new threads and replies.
pub fn validate_message(message: &str, banned_words: &[String]) -> Result<()> {
    if message.trim().is_empty() {
        return Err(AppError::validation("本文を入力してください"));
    }
    if contains_banned_word(message, banned_words) {
        return Err(AppError::validation("禁止されている単語が含まれています"));
    }
    if longest_run(message) > MAX_REPEAT_RUN {
        return Err(AppError::validation("連続した文字の繰り返しは禁止されています"));
    }
    if count_urls(message) > MAX_URLS {
        return Err(AppError::validation("URLが多すぎます"));
    }
    Ok(())
}

fn check_length(field: &str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max {
        return Err(AppError::validation(format!(
            "{field} exceeds {max} characters ({len})"
        )));
    }
    Ok(())
}

fn contains_banned_word(message: &str, banned_words: &[String]) -> bool {
    let lower = message.to_lowercase();
    banned_words
        .iter()
        .filter(|word| !word.is_empty())
        .any(|word| lower.contains(&word.to_lowercase()))
}

fn longest_run(text: &str) -> usize {
    let mut longest = 0;
    let mut run = 0;
    let mut previous = None;
    for c in text.chars() {
        run = if previous == Some(c) { run + 1 } else { 1 };
        longest = longest.max(run);
        previous = Some(c);
    }
    longest
}

fn count_urls(text: &str) -> usize {
    let lower = text.to_ascii_lowercase();
    lower.matches("http://").count() + lower.matches("https://").count()
}
