//! In-process reference application for the integration suite
//!
//! A small axum app with the routes, markup and Devise-style session
//! handling of the graded photo sharing application, backed by an on-disk
//! SQLite database with the Rails schema. The `Broken` flavor gets a
//! specific set of rubric items wrong.

#![allow(dead_code)]

use axum::extract::{Form, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use rubric_common::db::rails_timestamp;
use rubric_e2e::{Catalog, DriverConfig, RunOutcome, Runner, RunnerConfig, Timeouts};

const SESSION_COOKIE: &str = "_session_id";

pub const SCHEMA: &str = r#"
    CREATE TABLE users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL DEFAULT '',
        encrypted_password TEXT NOT NULL DEFAULT '',
        username TEXT,
        comments_count INTEGER DEFAULT 0,
        likes_count INTEGER DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE UNIQUE INDEX index_users_on_email ON users(email);
    CREATE UNIQUE INDEX index_users_on_username ON users(username);
    CREATE TABLE photos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        image TEXT,
        caption TEXT,
        owner_id INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        body TEXT,
        author_id INTEGER NOT NULL,
        photo_id INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
"#;

/// Users only; the photo and comment groups are gated off.
pub const USERS_ONLY_SCHEMA: &str = r#"
    CREATE TABLE users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL DEFAULT '',
        encrypted_password TEXT NOT NULL DEFAULT '',
        username TEXT,
        comments_count INTEGER DEFAULT 0,
        likes_count INTEGER DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE UNIQUE INDEX index_users_on_email ON users(email);
    CREATE UNIQUE INDEX index_users_on_username ON users(username);
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Implements every rubric item
    Compliant,
    /// Plain nav, no DELETE sign-out, no auth guard, no cards, comment
    /// form that saves nothing, no liked page, no likes_count default
    Broken,
    /// Rejects every sign-in
    Locked,
    /// No root route; sign-in lands on /dashboard
    Homeless,
}

impl Flavor {
    pub fn schema(self) -> String {
        match self {
            Flavor::Broken => SCHEMA.replace("likes_count INTEGER DEFAULT 0", "likes_count INTEGER"),
            _ => SCHEMA.to_string(),
        }
    }
}

#[derive(Clone)]
struct AppState {
    flavor: Flavor,
    db: Arc<Mutex<Connection>>,
    sessions: Arc<Mutex<HashMap<String, i64>>>,
}

pub struct ReferenceApp {
    pub base_url: String,
    pub db_path: PathBuf,
    server: JoinHandle<()>,
    _dir: TempDir,
}

impl ReferenceApp {
    pub async fn start(flavor: Flavor) -> Self {
        Self::start_with_schema(flavor, &flavor.schema()).await
    }

    pub async fn start_with_schema(flavor: Flavor, schema: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("development.sqlite3");
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(schema).unwrap();
        conn.busy_timeout(Duration::from_secs(5)).unwrap();

        let state = AppState {
            flavor,
            db: Arc::new(Mutex::new(conn)),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        };
        let router = Router::new()
            .route("/", get(home))
            .route("/users/sign_in", get(sign_in_page).post(sign_in))
            .route("/users/sign_out", post(sign_out).delete(sign_out).get(sign_out))
            .route("/users/edit", get(edit_profile))
            .route("/dashboard", get(dashboard))
            .route("/comments", post(create_comment))
            .fallback(user_pages)
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            db_path,
            server,
            _dir: dir,
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            database: self.db_path.clone(),
            driver: DriverConfig {
                base_url: self.base_url.clone(),
                request_timeout: Duration::from_secs(5),
                ..Default::default()
            },
            timeouts: Timeouts {
                fixture: Duration::from_secs(5),
                scenario: Duration::from_secs(20),
            },
            ready_timeout: Some(Duration::from_secs(5)),
            output_dir: self._dir.path().join("results"),
            ..Default::default()
        }
    }

    pub async fn grade(&self, catalog: &Catalog) -> RunOutcome {
        let mut runner = Runner::new(self.runner_config()).unwrap();
        runner.run(catalog).await.unwrap()
    }
}

impl Drop for ReferenceApp {
    fn drop(&mut self) {
        self.server.abort();
    }
}

// ============================================================================
// Session handling
// ============================================================================

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

fn current_user(state: &AppState, headers: &HeaderMap) -> Option<(i64, String)> {
    let id = *state.sessions.lock().get(&session_id(headers)?)?;
    let username = state
        .db
        .lock()
        .query_row("SELECT username FROM users WHERE id = ?1", params![id], |r| r.get(0))
        .optional()
        .ok()??;
    Some((id, username))
}

// ============================================================================
// Markup
// ============================================================================

fn layout(body: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html><head>
<meta name="csrf-param" content="authenticity_token">
<meta name="csrf-token" content="reference-token">
<title>Photogram</title>
</head><body>
{}
</body></html>"#,
        body
    ))
}

fn navbar(state: &AppState, user: Option<&(i64, String)>) -> String {
    let links = match (state.flavor, user) {
        (Flavor::Broken, Some(_)) => r#"<a href="/users/edit">Edit profile</a>
<a href="/users/sign_out">Sign out</a>
<a href="/users/sign_in">Sign in</a>"#
            .to_string(),
        (_, Some((_, username))) => format!(
            r#"<a href="/users/edit">Edit {}</a>
<a href="/users/sign_out" data-method="delete" rel="nofollow">Sign out</a>"#,
            username
        ),
        (_, None) => r#"<a href="/users/sign_in">Sign in</a>
<a href="/users/sign_up">Sign up</a>"#
            .to_string(),
    };
    let class = if state.flavor == Flavor::Broken {
        "nav"
    } else {
        "navbar navbar-expand-lg navbar-light bg-light"
    };
    format!(r#"<nav class="{}"><a href="/">Photogram</a>{}</nav>"#, class, links)
}

fn sign_in_form(state: &AppState, alert: Option<&str>) -> String {
    format!(
        r#"{}
{}
<h1>Log in</h1>
<form action="/users/sign_in" method="post">
  <input type="hidden" name="authenticity_token" value="reference-token">
  <label for="user_email">Email</label>
  <input type="email" id="user_email" name="user[email]" value="">
  <label for="user_password">Password</label>
  <input type="password" id="user_password" name="user[password]">
  <input type="submit" name="commit" value="Log in">
</form>"#,
        navbar(state, None),
        alert
            .map(|a| format!(r#"<p class="alert">{}</p>"#, a))
            .unwrap_or_default()
    )
}

// ============================================================================
// Handlers
// ============================================================================

async fn home(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if state.flavor == Flavor::Homeless {
        return (StatusCode::NOT_FOUND, layout("<h1>Not Found</h1>")).into_response();
    }
    let user = current_user(&state, &headers);
    layout(&format!("{}<h1>Photogram</h1>", navbar(&state, user.as_ref()))).into_response()
}

async fn dashboard(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    let user = current_user(&state, &headers);
    layout(&format!("{}<h1>Dashboard</h1>", navbar(&state, user.as_ref())))
}

async fn sign_in_page(State(state): State<AppState>) -> Html<String> {
    layout(&sign_in_form(&state, None))
}

async fn sign_in(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let email = form.get("user[email]").cloned().unwrap_or_default();
    let password = form.get("user[password]").cloned().unwrap_or_default();

    let found: Option<(i64, String)> = state
        .db
        .lock()
        .query_row(
            "SELECT id, encrypted_password FROM users WHERE email = ?1",
            params![email],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .unwrap_or(None);

    let verified = match (&found, state.flavor) {
        (_, Flavor::Locked) => None,
        (Some((id, digest)), _) => bcrypt::verify(&password, digest)
            .unwrap_or(false)
            .then_some(*id),
        (None, _) => None,
    };

    match verified {
        Some(id) => {
            let sid = format!("{:016x}", rand::thread_rng().gen::<u64>());
            state.sessions.lock().insert(sid.clone(), id);
            (
                [(header::SET_COOKIE, format!("{}={}; Path=/; HttpOnly", SESSION_COOKIE, sid))],
                Redirect::to(if state.flavor == Flavor::Homeless { "/dashboard" } else { "/" }),
            )
                .into_response()
        }
        None => (
            StatusCode::UNPROCESSABLE_ENTITY,
            layout(&sign_in_form(&state, Some("Invalid Email or password."))),
        )
            .into_response(),
    }
}

async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(sid) = session_id(&headers) {
        state.sessions.lock().remove(&sid);
    }
    (
        [(header::SET_COOKIE, format!("{}=; Path=/; Max-Age=0", SESSION_COOKIE))],
        Redirect::to("/"),
    )
        .into_response()
}

async fn edit_profile(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match current_user(&state, &headers) {
        Some(user) => layout(&format!(
            r#"{}<h1>Edit User</h1>
<form action="/users" method="post">
  <label for="user_username">Username</label>
  <input id="user_username" name="user[username]" value="{}">
  <input type="submit" value="Update">
</form>"#,
            navbar(&state, Some(&user)),
            user.1
        ))
        .into_response(),
        None => Redirect::to("/users/sign_in").into_response(),
    }
}

async fn create_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let Some((author_id, username)) = current_user(&state, &headers) else {
        return Redirect::to("/users/sign_in").into_response();
    };
    let photo_id: i64 = form
        .get("comment[photo_id]")
        .and_then(|v| v.parse().ok())
        .unwrap_or_default();
    let body = form.get("comment[body]").cloned().unwrap_or_default();

    if state.flavor != Flavor::Broken {
        let stamp = rails_timestamp();
        let inserted = state.db.lock().execute(
            "INSERT INTO comments (body, author_id, photo_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
            params![body, author_id, photo_id, stamp],
        );
        if inserted.is_err() {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    Redirect::to(&format!("/{}", username)).into_response()
}

/// `/:username` and `/:username/liked`
async fn user_pages(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if method != Method::GET {
        return StatusCode::NOT_FOUND.into_response();
    }
    let segments: Vec<&str> = uri.path().trim_matches('/').split('/').collect();
    let user = current_user(&state, &headers);
    if user.is_none() && state.flavor != Flavor::Broken {
        return Redirect::to("/users/sign_in").into_response();
    }

    let owner: Option<i64> = state
        .db
        .lock()
        .query_row(
            "SELECT id FROM users WHERE username = ?1",
            params![segments[0]],
            |r| r.get(0),
        )
        .optional()
        .unwrap_or(None);
    let Some(owner_id) = owner else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match segments.as_slice() {
        [username] => photos_page(&state, user.as_ref(), username, owner_id),
        [username, "liked"] if state.flavor != Flavor::Broken => layout(&format!(
            "{}<h1>Photos {} liked</h1>",
            navbar(&state, user.as_ref()),
            username
        ))
        .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

fn photos_page(
    state: &AppState,
    user: Option<&(i64, String)>,
    username: &str,
    owner_id: i64,
) -> Response {
    let photos: Vec<(i64, String)> = {
        let db = state.db.lock();
        let Ok(mut stmt) = db.prepare("SELECT id, caption FROM photos WHERE owner_id = ?1 ORDER BY id")
        else {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };
        let rows = stmt.query_map(params![owner_id], |r| Ok((r.get(0)?, r.get(1)?)));
        match rows.and_then(|rows| rows.collect::<Result<Vec<_>, _>>()) {
            Ok(photos) => photos,
            Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    };

    let wrapper = if state.flavor == Flavor::Broken {
        "li"
    } else {
        "div"
    };
    let cards: String = photos
        .iter()
        .map(|(id, caption)| {
            format!(
                r#"<{wrapper} class="card mb-4">
  <p class="card-text">{caption}</p>
  <form action="/comments" method="post">
    <input type="hidden" name="authenticity_token" value="reference-token">
    <input type="hidden" name="comment[photo_id]" value="{id}">
    <label for="comment_body_{id}">Body</label>
    <textarea id="comment_body_{id}" name="comment[body]"></textarea>
    <input type="submit" name="commit" value="Create Comment">
  </form>
</{wrapper}>"#
            )
        })
        .collect();

    layout(&format!(
        "{}<h1>{}</h1>\n{}",
        navbar(state, user),
        username,
        cards
    ))
    .into_response()
}
