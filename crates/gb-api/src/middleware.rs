//! Access logging and CORS for the board.

use crate::handlers::CLIENT_IP_HEADER;
use actix_cors::Cors;
use actix_web::http::{header, Method};
use actix_web::middleware::Logger;

/// Target the access log is emitted under.
pub const ACCESS_LOG_TARGET: &str = "gb_api::access";

/// One access line per request. The proxy-reported client address comes
/// first since the peer is usually the proxy itself; then peer, request
/// line, status, bytes and milliseconds.
pub fn access_log() -> Logger {
    Logger::new(&format!("%{{{CLIENT_IP_HEADER}}}i %a \"%r\" %s %b %Dms"))
        .log_target(ACCESS_LOG_TARGET)
}

/// Browser readers on other origins poll the JSON routes and may post to
/// `bbs.cgi` with a form body. Legacy text routes are plain GETs.
pub fn cors_policy() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods([Method::GET, Method::POST])
        .allowed_header(header::CONTENT_TYPE)
        .max_age(3600)
}
