use anyhow::{anyhow, Context, Result};
use chrono::{prelude::*, Duration};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::capture::{CaptureError, TaskInput};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTask {
    pub text: String,
    pub due_date: Option<DateTime<Utc>>,
}

/// Result of inline token parsing from the capture text.
#[derive(Debug, Default)]
struct InlineTokens {
    words: Vec<String>,
    due_date: Option<DateTime<Utc>>,
}

pub fn parse_capture(input: &TaskInput, now: DateTime<Utc>) -> Result<ParsedTask> {
    input.require_text()?;
    let raw_text = input.text.join(" ");
    let inline = parse_inline_tokens(&raw_text, now)?;

    let due_date = match &input.due {
        Some(spec) => Some(parse_date_spec(spec, now)?),
        None => inline.due_date,
    };

    let text = inline.words.join(" ").trim().to_string();
    if text.is_empty() {
        return Err(CaptureError::EmptyText.into());
    }

    Ok(ParsedTask { text, due_date })
}

fn parse_inline_tokens(text: &str, now: DateTime<Utc>) -> Result<InlineTokens> {
    let mut result = InlineTokens::default();

    for raw_piece in text.split_whitespace() {
        let (piece, trailing) = strip_trailing_punctuation(raw_piece);
        if let Some(spec) = piece.strip_prefix("due:") {
            if spec.is_empty() {
                result.words.push(raw_piece.to_string());
                continue;
            }
            result.due_date = Some(parse_date_spec(spec, now)?);
            if let Some(rest) = trailing {
                push_trailing(&mut result.words, rest);
            }
            continue;
        }

        result.words.push(raw_piece.to_string());
    }

    Ok(result)
}

fn strip_trailing_punctuation(input: &str) -> (String, Option<String>) {
    static PUNCT_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[,;!?.]+$").expect("valid regex"));
    if let Some(mat) = PUNCT_RE.find(input) {
        let token = input[..mat.start()].to_string();
        let trailing = input[mat.start()..].to_string();
        (token, Some(trailing))
    } else {
        (input.to_string(), None)
    }
}

fn push_trailing(words: &mut Vec<String>, trailing: String) {
    if let Some(last) = words.last_mut() {
        last.push_str(&trailing);
    }
}

/// Resolve a human date specification relative to `now`, interpreting calendar forms in
/// the local timezone.
pub fn parse_date_spec(spec: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Date specification cannot be empty"));
    }

    let lower = trimmed.to_ascii_lowercase();
    let now_local = now.with_timezone(&Local);

    match lower.as_str() {
        "now" => return Ok(now),
        "today" => return local_morning(now_local.date_naive()),
        "tomorrow" => return local_morning(now_local.date_naive() + Duration::days(1)),
        _ => {}
    }

    if lower.starts_with('+') {
        return parse_relative_spec(&lower, now);
    }

    if let Some(weekday) = parse_weekday(&lower) {
        let mut days_ahead = (weekday.num_days_from_monday() as i64
            - now_local.weekday().num_days_from_monday() as i64)
            .rem_euclid(7);
        if days_ahead == 0 {
            days_ahead = 7;
        }
        return local_morning(now_local.date_naive() + Duration::days(days_ahead));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return resolve_local(naive, trimmed);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return local_morning(date);
    }

    if let Ok(time) = NaiveTime::parse_from_str(trimmed, "%H:%M") {
        return resolve_local(now_local.date_naive().and_time(time), trimmed);
    }

    Err(anyhow!(
        "Unrecognized date specification '{}'. Try YYYY-MM-DDTHH:MM, today, tomorrow, +2h, +30min, mon",
        spec
    ))
}

fn parse_relative_spec(spec: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    static RELATIVE_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\+(\d+)(min|m|h|d|w)$").expect("valid regex"));
    let captures = RELATIVE_RE
        .captures(spec)
        .ok_or_else(|| anyhow!("Relative date '{}' must look like +30min, +2h, +3d, +1w", spec))?;
    let value: i64 = captures[1].parse().context("Invalid relative offset")?;
    let offset = match &captures[2] {
        "min" | "m" => Duration::try_minutes(value),
        "h" => Duration::try_hours(value),
        "d" => Duration::try_days(value),
        "w" => Duration::try_weeks(value),
        other => return Err(anyhow!("Unsupported relative unit '{}'", other)),
    };
    offset
        .and_then(|offset| now.checked_add_signed(offset))
        .ok_or_else(|| anyhow!("Relative date '{}' is out of range", spec))
}

fn local_morning(date: NaiveDate) -> Result<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(9, 0, 0).ok_or_else(|| anyhow!("invalid morning time"))?;
    resolve_local(date.and_time(time), &date.to_string())
}

fn resolve_local(naive: NaiveDateTime, label: &str) -> Result<DateTime<Utc>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("Could not resolve local time for '{}'", label))
}

fn parse_weekday(label: &str) -> Option<Weekday> {
    match label {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}
