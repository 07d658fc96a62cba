use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    Router,
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use clap::Parser;
use lidraughts_oauth::{
    Authenticated, CallbackParams, OAuthError, PendingAuthorization, Profile, Strategy,
    StrategyConfig, TokenResponse, Verify, random_token,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const SESSION_COOKIE: &str = "lidraughts_sid";
const SESSION_ID_BYTES: usize = 32;

#[derive(Debug, Parser)]
#[command(
    name = "lidraughts-login",
    about = "Example web app that signs users in with their Lidraughts account."
)]
struct Cli {
    #[arg(long, env = "LIDRAUGHTS_CLIENT_ID", default_value = "example.com")]
    client_id: String,

    #[arg(long, env = "LIDRAUGHTS_CLIENT_SECRET")]
    client_secret: Option<String>,

    #[arg(
        long,
        env = "LIDRAUGHTS_CALLBACK_URL",
        default_value = "http://localhost:5000/auth/lidraughts/callback"
    )]
    callback_url: String,

    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:5000")]
    listen: String,

    /// Scope to request. Repeat for several.
    #[arg(long = "scope")]
    scopes: Vec<String>,

    /// Send a PKCE challenge with the authorization request.
    #[arg(long, default_value_t = false)]
    pkce: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Unfinished logins are dropped after this long.
const PENDING_TTL: Duration = Duration::from_secs(10 * 60);
const MAX_PENDING: usize = 10_000;

#[derive(Debug)]
enum Session {
    Pending {
        pending: PendingAuthorization,
        started: Instant,
    },
    SignedIn(Profile),
}

impl Session {
    fn is_expired(&self, now: Instant) -> bool {
        match self {
            Session::Pending { started, .. } => now.duration_since(*started) > PENDING_TTL,
            Session::SignedIn(_) => false,
        }
    }
}

/// In-memory sessions. Only `begin` creates entries; lookups never do.
#[derive(Debug)]
struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    max_pending: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_max_pending(MAX_PENDING)
    }
}

impl SessionStore {
    fn with_max_pending(max_pending: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_pending,
        }
    }

    /// Records a started login. Returns false when it could not be stored.
    fn begin(&self, session_id: &str, pending: PendingAuthorization, now: Instant) -> bool {
        let Ok(mut sessions) = self.sessions.lock() else {
            return false;
        };
        sessions.retain(|_, session| !session.is_expired(now));

        let pending_count = sessions
            .values()
            .filter(|session| matches!(session, Session::Pending { .. }))
            .count();
        let replaces_pending = matches!(sessions.get(session_id), Some(Session::Pending { .. }));
        if pending_count >= self.max_pending && !replaces_pending {
            return false;
        }

        sessions.insert(
            session_id.to_string(),
            Session::Pending {
                pending,
                started: now,
            },
        );
        true
    }

    /// Removes a pending login and returns it if it has not expired.
    fn take_pending(&self, session_id: &str, now: Instant) -> Option<PendingAuthorization> {
        let mut sessions = self.sessions.lock().ok()?;
        if !matches!(sessions.get(session_id)?, Session::Pending { .. }) {
            return None;
        }
        match sessions.remove(session_id)? {
            Session::Pending { pending, started } if now.duration_since(started) <= PENDING_TTL => {
                Some(pending)
            }
            _ => None,
        }
    }

    fn sign_in(&self, session_id: &str, user: Profile) -> bool {
        let Ok(mut sessions) = self.sessions.lock() else {
            return false;
        };
        sessions.insert(session_id.to_string(), Session::SignedIn(user));
        true
    }

    fn username(&self, session_id: &str) -> Option<String> {
        let sessions = self.sessions.lock().ok()?;
        match sessions.get(session_id)? {
            Session::SignedIn(user) => Some(user.username.clone()),
            Session::Pending { .. } => None,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions.lock().map(|sessions| sessions.len()).unwrap_or(0)
    }
}

struct AppState<V> {
    strategy: Arc<Strategy<V>>,
    sessions: Arc<SessionStore>,
}

impl<V> Clone for AppState<V> {
    fn clone(&self) -> Self {
        Self {
            strategy: self.strategy.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), OAuthError> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let mut config = StrategyConfig::new(cli.client_id, cli.callback_url)
        .with_scope(cli.scopes)
        .with_pkce(cli.pkce);
    if let Some(secret) = cli.client_secret {
        config = config.with_client_secret(secret);
    }

    let strategy = Strategy::new(config, |_tokens: TokenResponse, profile: Profile| async move {
        Ok::<_, Infallible>(Some(profile))
    })?;

    let state = AppState {
        strategy: Arc::new(strategy),
        sessions: Arc::new(SessionStore::default()),
    };

    let listener = tokio::net::TcpListener::bind(&cli.listen).await?;
    info!("listening on http://{}/", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();
}

fn router<V>(state: AppState<V>) -> Router
where
    V: Verify<User = Profile> + 'static,
{
    Router::new()
        .route("/", get(index))
        .route("/auth/lidraughts", get(login::<V>))
        .route("/auth/lidraughts/callback", get(callback::<V>))
        .route("/ok", get(ok::<V>))
        .route("/nope", get(nope))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(r#"<a href="/auth/lidraughts">Login</a>"#)
}

async fn login<V>(State(state): State<AppState<V>>, jar: CookieJar) -> Response
where
    V: Verify<User = Profile> + 'static,
{
    let (jar, session_id) = match ensure_session(jar) {
        Ok(session) => session,
        Err(err) => {
            warn!(error = %err, "failed to create session");
            return Redirect::to("/nope").into_response();
        }
    };

    let request = match state.strategy.authorize() {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "failed to build authorization url");
            return Redirect::to("/nope").into_response();
        }
    };

    if !state
        .sessions
        .begin(&session_id, request.pending(), Instant::now())
    {
        warn!("could not store pending authorization");
        return Redirect::to("/nope").into_response();
    }

    (jar, Redirect::to(&request.authorization_url)).into_response()
}

async fn callback<V>(
    State(state): State<AppState<V>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response
where
    V: Verify<User = Profile> + 'static,
{
    let Some(session_id) = jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_string())
    else {
        warn!("callback without session cookie");
        return Redirect::to("/nope").into_response();
    };

    let Some(pending) = state.sessions.take_pending(&session_id, Instant::now()) else {
        warn!("callback without pending authorization");
        return Redirect::to("/nope").into_response();
    };

    match state.strategy.authenticate(params, &pending).await {
        Ok(Authenticated { user, .. }) => {
            info!(username = %user.username, "user signed in");
            if !state.sessions.sign_in(&session_id, user) {
                warn!("could not store signed-in session");
                return Redirect::to("/nope").into_response();
            }
            Redirect::to("/ok").into_response()
        }
        Err(err) => {
            warn!(error = %err, "authentication failed");
            Redirect::to("/nope").into_response()
        }
    }
}

async fn ok<V>(State(state): State<AppState<V>>, jar: CookieJar) -> Response
where
    V: Verify<User = Profile> + 'static,
{
    let username = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| state.sessions.username(cookie.value()));

    match username {
        Some(username) => format!("Hello {username}!").into_response(),
        None => Redirect::to("/").into_response(),
    }
}

async fn nope() -> &'static str {
    "Authentication failed"
}

fn ensure_session(jar: CookieJar) -> Result<(CookieJar, String), OAuthError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let session_id = cookie.value().to_string();
        return Ok((jar, session_id));
    }

    let session_id = random_token(SESSION_ID_BYTES)?;
    let cookie = Cookie::build((SESSION_COOKIE, session_id.clone()))
        .path("/")
        .http_only(true)
        .build();
    Ok((jar.add(cookie), session_id))
}
