pub mod admin;
pub mod appointments;
pub mod health;
pub mod masters;
pub mod notifications;
pub mod reviews;
pub mod schedule;
pub mod services;
pub mod telegram;
pub mod users;

use axum::extract::{FromRequest, FromRequestParts};
use chrono::NaiveDate;

use crate::error::{AppError, AppResult, Invalid};

// ── Extractors with enveloped rejections ──

/// `Json` whose rejection is a localized 400 envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

// ── Field parsing ──

/// Parse a required positive id given as a raw query value.
pub(crate) fn parse_id(raw: Option<&str>, field: &'static str) -> AppResult<i64> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(Invalid::Missing(field))?;
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(Invalid::Format(field).into()),
    }
}

/// Parse a required `YYYY-MM-DD` date.
pub(crate) fn parse_date(raw: Option<&str>, field: &'static str) -> AppResult<NaiveDate> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(Invalid::Missing(field))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| Invalid::Format(field).into())
}

/// Trimmed non-empty text, or `Missing(field)`.
pub(crate) fn required_text<'a>(value: &'a str, field: &'static str) -> AppResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(Invalid::Missing(field)));
    }
    Ok(value)
}
