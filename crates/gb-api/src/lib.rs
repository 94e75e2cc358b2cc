//! # gb-api
//!
//! The HTTP layer for Goblin-Board: the legacy 2ch-style read and write
//! endpoints plus two JSON polls.

pub mod error;
pub mod handlers;
pub mod middleware;

pub use handlers::AppState;

use actix_web::web;

/// Configures the routes for the board.
///
/// # Developer Note
/// Routes are matched in registration order, so the JSON poll under
/// `read.cgi` must come before the catch-all range route.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // The posting endpoint (new thread or reply)
        .route("/test/bbs.cgi", web::post().to(handlers::bbs_cgi))
        .route("/test/read.cgi/{board}/{id}/api", web::get().to(handlers::read_api))
        // e.g. /test/read.cgi/poverty/1700000000/l50
        .route("/test/read.cgi/{board}/{path:.*}", web::get().to(handlers::read_dat))
        .route("/{board}/subject.txt", web::get().to(handlers::subject_txt))
        .route("/{board}/SETTING.TXT", web::get().to(handlers::setting_txt))
        .route("/{board}/dat/{file}", web::get().to(handlers::dat_file))
        .route("/{board}/api/threads", web::get().to(handlers::threads_api));
}
