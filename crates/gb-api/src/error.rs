//! HTTP renderings of [`AppError`].
//!
//! Legacy routes answer with a small Shift-JIS page whose body starts with
//! `ＥＲＲＯＲ: `, which is what 2ch-style browsers scrape. JSON routes answer
//! `{"error": ...}`.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use gb_core::encoding::{encode_outbound, SJIS_HTML_CONTENT_TYPE};
use gb_core::AppError;
use std::fmt;

fn status_of(err: &AppError) -> StatusCode {
    match err {
        AppError::NotFound(..) => StatusCode::NOT_FOUND,
        AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
        AppError::Archived(_) => StatusCode::FORBIDDEN,
        AppError::Conflict(_) => StatusCode::CONFLICT,
        AppError::WriteFailed(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Text shown to the client. Storage details stay in the log.
fn public_message(err: &AppError) -> String {
    match err {
        AppError::NotFound(kind, _) if kind == "board" => "そんな板ありません".to_string(),
        AppError::NotFound(..) => "そんなスレッドありません".to_string(),
        AppError::ValidationError(msg) => msg.clone(),
        AppError::Archived(_) => "このスレッドは過去ログ倉庫に格納されています".to_string(),
        AppError::Conflict(_) => "スレッドと板が一致しません".to_string(),
        AppError::WriteFailed(_) | AppError::Internal(_) => {
            tracing::error!(error = %err, "request failed");
            "サーバーエラーが発生しました".to_string()
        }
    }
}

#[derive(Debug)]
pub struct LegacyError(pub AppError);

impl From<AppError> for LegacyError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl fmt::Display for LegacyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl ResponseError for LegacyError {
    fn status_code(&self) -> StatusCode {
        status_of(&self.0)
    }

    fn error_response(&self) -> HttpResponse {
        let page = format!(
            "<html><head><title>ＥＲＲＯＲ！</title></head><body>ＥＲＲＯＲ: {}</body></html>",
            public_message(&self.0)
        );
        HttpResponse::build(self.status_code())
            .content_type(SJIS_HTML_CONTENT_TYPE)
            .body(encode_outbound(&page))
    }
}

#[derive(Debug)]
pub struct JsonError(pub AppError);

impl From<AppError> for JsonError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl fmt::Display for JsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl ResponseError for JsonError {
    fn status_code(&self) -> StatusCode {
        status_of(&self.0)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "error": public_message(&self.0) }))
    }
}
