//! # gb-api Handlers
//!
//! This module coordinates the flow between legacy HTTP requests and the
//! thread lifecycle. Legacy routes speak Shift-JIS; the `api` routes speak
//! UTF-8 JSON.

use crate::error::{JsonError, LegacyError};
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use gb_core::board::{self, BoardConfig, BoardRegistry};
use gb_core::datetime::format_dat_date;
use gb_core::encoding::{encode_outbound, SJIS_HTML_CONTENT_TYPE, SJIS_TEXT_CONTENT_TYPE};
use gb_core::form::PostForm;
use gb_core::validation::validate_post;
use gb_core::{
    AppError, AppendRequest, CreateRequest, IdentityProvider, PostFields, RangeQuery,
    ThreadId, ThreadLifecycle,
};
use serde::Deserialize;

/// Header set by the fronting proxy with the real client address.
pub const CLIENT_IP_HEADER: &str = "CF-Connecting-IP";

/// State shared across all Actix-web workers.
pub struct AppState {
    pub lifecycle: ThreadLifecycle,
    pub identity: Box<dyn IdentityProvider>,
    pub boards: BoardRegistry,
    pub banned_words: Vec<String>,
}

impl AppState {
    fn board(&self, key: &str) -> Result<&BoardConfig, AppError> {
        self.boards.get(key).ok_or_else(|| AppError::board_not_found(key))
    }
}

fn sjis_text(body: &str) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(SJIS_TEXT_CONTENT_TYPE)
        .body(encode_outbound(body))
}

fn parse_thread_id(raw: &str) -> Result<ThreadId, AppError> {
    raw.parse::<ThreadId>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::NotFound("thread".to_string(), raw.to_string()))
}

/// `GET /{board}/subject.txt`
pub async fn subject_txt(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, LegacyError> {
    let board = path.into_inner();
    data.board(&board)?;
    Ok(sjis_text(&data.lifecycle.subject_txt(&board).await?))
}

/// `GET /{board}/SETTING.TXT`
pub async fn setting_txt(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, LegacyError> {
    let board = path.into_inner();
    let config = data.board(&board)?;
    Ok(sjis_text(&board::setting_txt(&board, config)))
}

/// `GET /{board}/dat/{id}.dat`: the whole blob, archived or not.
pub async fn dat_file(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, LegacyError> {
    let (board, file) = path.into_inner();
    data.board(&board)?;
    let id = parse_thread_id(file.strip_suffix(".dat").unwrap_or(&file))?;
    let thread = data.lifecycle.get(&board, id).await?;
    Ok(sjis_text(&thread.dat))
}

/// `GET /test/read.cgi/{board}/{id}[/{range}]`: range-filtered DAT lines.
pub async fn read_dat(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, LegacyError> {
    let (board, rest) = path.into_inner();
    data.board(&board)?;
    let (id, query) = RangeQuery::parse_path(&rest);
    let thread = data.lifecycle.get(&board, parse_thread_id(id)?).await?;
    Ok(sjis_text(&query.slice_dat(&thread.dat)))
}

#[derive(Debug, Deserialize)]
pub struct ReadParams {
    /// Only posts with a greater ordinal are returned.
    pub after: Option<usize>,
}

/// `GET /test/read.cgi/{board}/{id}/api?after=n`: JSON poll for new posts.
pub async fn read_api(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    params: web::Query<ReadParams>,
) -> Result<HttpResponse, JsonError> {
    let (board, id) = path.into_inner();
    data.board(&board)?;
    let query = match params.after {
        Some(after) => RangeQuery::FromTo {
            start: Some(after.saturating_add(1)),
            end: None,
        },
        None => RangeQuery::All,
    };
    let view = data.lifecycle.read(&board, parse_thread_id(&id)?, &query).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// `GET /{board}/api/threads`: every thread with its state, newest first.
pub async fn threads_api(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, JsonError> {
    let board = path.into_inner();
    data.board(&board)?;
    Ok(HttpResponse::Ok().json(data.lifecycle.subjects(&board).await?))
}

/// `POST /test/bbs.cgi`: opens a thread when `key` is empty, replies otherwise.
pub async fn bbs_cgi(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, LegacyError> {
    let form = PostForm::from_body(&body)?;
    let board = data.board(&form.bbs)?;
    validate_post(&form, &board.limit, &data.banned_words)?;

    let now = Utc::now();
    let address = client_address(&req);
    let PostForm {
        bbs,
        key,
        from,
        mail,
        subject,
        message,
    } = form;

    let fields = PostFields {
        name: if from.is_empty() {
            board.nanashi.clone()
        } else {
            from
        },
        mail,
        date: format_dat_date(&now),
        uid: data.identity.derive_identity(&address, &bbs, now),
        be: None,
        body: message,
    };

    let thread_id = match key {
        Some(thread_id) => {
            data.lifecycle
                .append(AppendRequest {
                    thread_id,
                    board: bbs.clone(),
                    fields,
                })
                .await?;
            thread_id
        }
        None => {
            data.lifecycle
                .create(CreateRequest {
                    board: bbs.clone(),
                    subject: subject.unwrap_or_default(),
                    fields,
                })
                .await?
        }
    };

    Ok(HttpResponse::Ok()
        .content_type(SJIS_HTML_CONTENT_TYPE)
        .body(encode_outbound(&confirmation_page(&bbs, thread_id))))
}

fn client_address(req: &HttpRequest) -> String {
    req.headers()
        .get(CLIENT_IP_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()))
        .unwrap_or_default()
}

// Browsers key on the title to detect a successful write.
fn confirmation_page(board: &str, thread_id: ThreadId) -> String {
    format!(
        "<html><head><title>書きこみました。</title>\
         <meta http-equiv=\"Content-Type\" content=\"text/html; charset=Shift_JIS\">\
         <meta http-equiv=\"refresh\" content=\"1;URL=/test/read.cgi/{board}/{thread_id}/\">\
         </head><body>書きこみが終わりました。<br><br>\
         画面を切り替えるまでしばらくお待ち下さい。</body></html>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configure_routes;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use gb_auth_simple::DailyIdentityProvider;
    use gb_core::encoding::decode_shift_jis;
    use gb_core::MockThreadRepo;
    use gb_db_memory::MemoryThreadRepo;
    use secrecy::SecretString;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn state_with(lifecycle: ThreadLifecycle) -> web::Data<AppState> {
        let mut boards = BTreeMap::new();
        boards.insert("poverty".to_string(), BoardConfig::default());
        web::Data::new(AppState {
            lifecycle,
            identity: Box::new(DailyIdentityProvider::new(SecretString::from(
                "test-secret".to_string(),
            ))),
            boards: BoardRegistry::new(boards),
            banned_words: vec!["spam".to_string()],
        })
    }

    fn state(max_posts: usize) -> web::Data<AppState> {
        state_with(
            ThreadLifecycle::new(Arc::new(MemoryThreadRepo::new())).with_max_posts(max_posts),
        )
    }

    /// Percent-escapes every byte, optionally after Shift-JIS encoding.
    fn escape(text: &str, sjis: bool) -> String {
        let bytes = if sjis {
            encode_outbound(text)
        } else {
            text.as_bytes().to_vec()
        };
        bytes.iter().map(|b| format!("%{b:02X}")).collect()
    }

    fn form(pairs: &[(&str, &str)], sjis: bool) -> String {
        pairs
            .iter()
            .map(|(key, value)| format!("{key}={}", escape(value, sjis)))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn post(body: String) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/test/bbs.cgi")
            .insert_header(("content-type", "application/x-www-form-urlencoded"))
            .insert_header((CLIENT_IP_HEADER, "203.0.113.7"))
            .set_payload(body)
    }

    async fn open_thread(data: &web::Data<AppState>, subject: &str) -> ThreadId {
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure_routes))
                .await;
        let body = form(
            &[("bbs", "poverty"), ("subject", subject), ("MESSAGE", "最初の書き込み")],
            false,
        );
        let res = test::call_service(&app, post(body).to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        data.lifecycle.subjects("poverty").await.unwrap()[0].id
    }

    #[actix_web::test]
    async fn new_thread_shows_up_in_subject_txt() {
        let data = state(1000);
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure_routes))
                .await;

        let body = form(
            &[("bbs", "poverty"), ("key", ""), ("subject", "テスト"), ("MESSAGE", "本文")],
            false,
        );
        let res = test::call_service(&app, post(body).to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let page = decode_shift_jis(&test::read_body(res).await);
        assert!(page.contains("<title>書きこみました。</title>"));

        let req = test::TestRequest::get().uri("/poverty/subject.txt").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(
            res.headers().get("content-type").unwrap(),
            SJIS_TEXT_CONTENT_TYPE
        );
        let text = decode_shift_jis(&test::read_body(res).await);
        let id = data.lifecycle.subjects("poverty").await.unwrap()[0].id;
        assert_eq!(text, format!("{id}.dat<>テスト (1)\n"));
        assert!(page.contains(&format!("/test/read.cgi/poverty/{id}/")));
    }

    #[actix_web::test]
    async fn shift_jis_reply_lands_in_the_dat() {
        let data = state(1000);
        let id = open_thread(&data, "スレ").await;
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure_routes))
                .await;

        let key = id.to_string();
        let body = form(
            &[
                ("bbs", "poverty"),
                ("key", key.as_str()),
                ("FROM", "ゴブリン"),
                ("MESSAGE", "こんにちは\n世界"),
            ],
            true,
        );
        let res = test::call_service(&app, post(body).to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri(&format!("/poverty/dat/{id}.dat"))
            .to_request();
        let dat = decode_shift_jis(&test::call_and_read_body(&app, req).await);
        let lines: Vec<&str> = dat.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("名無し<><>"));
        assert!(lines[0].ends_with("<>スレ"));
        assert!(lines[1].starts_with("ゴブリン<><>"));
        assert!(lines[1].ends_with("<>こんにちは<br>世界"));
        assert!(lines[1].contains(" ID:"));
    }

    #[actix_web::test]
    async fn same_address_gets_same_id_on_the_same_day() {
        let data = state(1000);
        let id = open_thread(&data, "id").await;
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure_routes))
                .await;

        let key = id.to_string();
        let body = form(&[("bbs", "poverty"), ("key", key.as_str()), ("MESSAGE", "again")], false);
        test::call_service(&app, post(body).to_request()).await;

        let view = data.lifecycle.read("poverty", id, &RangeQuery::All).await.unwrap();
        assert_eq!(view.records.len(), 2);
        assert_eq!(view.records[0].uid, view.records[1].uid);
    }

    #[actix_web::test]
    async fn read_cgi_applies_the_range() {
        let data = state(1000);
        let id = open_thread(&data, "range").await;
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure_routes))
                .await;
        for n in 2..=4 {
            let key = id.to_string();
            let message = format!("post {n}");
            let body = form(
                &[("bbs", "poverty"), ("key", key.as_str()), ("MESSAGE", message.as_str())],
                false,
            );
            test::call_service(&app, post(body).to_request()).await;
        }

        let fetch = |range: &str| {
            test::TestRequest::get()
                .uri(&format!("/test/read.cgi/poverty/{id}/{range}"))
                .to_request()
        };

        let text = decode_shift_jis(&test::call_and_read_body(&app, fetch("2-3")).await);
        let bodies: Vec<&str> = text
            .lines()
            .map(|line| line.rsplit("<>").next().unwrap())
            .collect();
        assert_eq!(bodies, ["post 2", "post 3"]);

        let text = decode_shift_jis(&test::call_and_read_body(&app, fetch("l1")).await);
        assert!(text.ends_with("<>post 4\n"));
        assert_eq!(text.lines().count(), 1);

        let text = decode_shift_jis(&test::call_and_read_body(&app, fetch("")).await);
        assert_eq!(text.lines().count(), 4);
    }

    #[actix_web::test]
    async fn read_api_returns_posts_after_n() {
        let data = state(1000);
        let id = open_thread(&data, "poll").await;
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure_routes))
                .await;
        let key = id.to_string();
        let body = form(&[("bbs", "poverty"), ("key", key.as_str()), ("MESSAGE", "second")], false);
        test::call_service(&app, post(body).to_request()).await;

        let req = test::TestRequest::get()
            .uri(&format!("/test/read.cgi/poverty/{id}/api?after=1"))
            .to_request();
        let json: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(json["total"], 2);
        assert_eq!(json["subject"], "poll");
        assert_eq!(json["records"].as_array().unwrap().len(), 1);
        assert_eq!(json["records"][0]["id"], 2);
        assert_eq!(json["records"][0]["message"], "second");

        let req = test::TestRequest::get().uri("/poverty/api/threads").to_request();
        let json: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(json[0]["id"], id);
        assert_eq!(json[0]["length"], 2);
        assert_eq!(json[0]["archived"], false);
    }

    #[actix_web::test]
    async fn reply_to_archived_thread_is_an_error_page() {
        let data = state(2);
        let id = open_thread(&data, "short").await;
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure_routes))
                .await;
        let key = id.to_string();

        let body = form(&[("bbs", "poverty"), ("key", key.as_str()), ("MESSAGE", "fills")], false);
        let res = test::call_service(&app, post(body).to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);

        let body = form(
            &[("bbs", "poverty"), ("key", key.as_str()), ("MESSAGE", "too late")],
            false,
        );
        let res = test::call_service(&app, post(body).to_request()).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let page = decode_shift_jis(&test::read_body(res).await);
        assert!(page.contains("ＥＲＲＯＲ: "));

        // Archived threads are still readable but drop out of subject.txt.
        let req = test::TestRequest::get().uri(&format!("/poverty/dat/{id}.dat")).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        let req = test::TestRequest::get().uri("/poverty/subject.txt").to_request();
        assert!(test::call_and_read_body(&app, req).await.is_empty());
    }

    #[actix_web::test]
    async fn invalid_posts_are_rejected_before_writing() {
        let data = state(1000);
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure_routes))
                .await;

        let no_subject = form(&[("bbs", "poverty"), ("MESSAGE", "body")], false);
        let banned = form(&[("bbs", "poverty"), ("subject", "s"), ("MESSAGE", "buy SPAM")], false);
        let no_message = form(&[("bbs", "poverty"), ("subject", "s")], false);
        for body in [no_subject, banned, no_message] {
            let res = test::call_service(&app, post(body).to_request()).await;
            assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        }

        let unknown = form(&[("bbs", "nope"), ("subject", "s"), ("MESSAGE", "m")], false);
        let res = test::call_service(&app, post(unknown).to_request()).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        assert!(data.lifecycle.subjects("poverty").await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn unknown_boards_and_threads_are_not_found() {
        let data = state(1000);
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure_routes))
                .await;

        for uri in [
            "/nope/subject.txt",
            "/nope/SETTING.TXT",
            "/poverty/dat/123.dat",
            "/poverty/dat/abc.dat",
            "/test/read.cgi/poverty/123/",
            "/nope/api/threads",
        ] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let res = test::call_service(&app, req).await;
            assert_eq!(res.status(), StatusCode::NOT_FOUND, "{uri}");
        }

        let req = test::TestRequest::get().uri("/test/read.cgi/poverty/123/api").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let json: serde_json::Value = test::read_body_json(res).await;
        assert!(json["error"].is_string());
    }

    #[actix_web::test]
    async fn setting_txt_is_served() {
        let data = state(1000);
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure_routes))
                .await;
        let req = test::TestRequest::get().uri("/poverty/SETTING.TXT").to_request();
        let text = decode_shift_jis(&test::call_and_read_body(&app, req).await);
        assert!(text.starts_with("poverty\nBBS_TITLE=ゴブリン掲示板\n"));
        assert!(text.contains("BBS_NONAME_NAME=名無し\n"));
    }

    #[actix_web::test]
    async fn storage_failures_do_not_leak_details() {
        let mut repo = MockThreadRepo::new();
        repo.expect_list_threads()
            .returning(|_| Err(anyhow::anyhow!("database is locked")));
        let data = state_with(ThreadLifecycle::new(Arc::new(repo)));
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure_routes))
                .await;

        let req = test::TestRequest::get().uri("/poverty/subject.txt").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let page = decode_shift_jis(&test::read_body(res).await);
        assert!(page.contains("ＥＲＲＯＲ: "));
        assert!(!page.contains("locked"));
    }
}
