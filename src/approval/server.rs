use super::ApprovalError;
use super::page;
use super::resolver::{Outcome, Resolver};
use super::session::ApprovalSession;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TOKEN_LEN: usize = 32;
const TEARDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone)]
struct ServerState {
    session: Arc<ApprovalSession>,
    token: Arc<str>,
    expires_at: DateTime<Utc>,
    resolver: Arc<Resolver>,
}

#[derive(Debug)]
struct Endpoint {
    addr: SocketAddr,
    approval_url: String,
    task: JoinHandle<()>,
}

/// A pending approval: one session, one resolution cell and, for the browser
/// method, one local HTTP listener.
///
/// Dropping the server without waiting resolves it as cancelled and tears
/// the listener down.
#[derive(Debug)]
pub struct ApprovalServer {
    session: Arc<ApprovalSession>,
    expires_at: DateTime<Utc>,
    resolver: Arc<Resolver>,
    receiver: oneshot::Receiver<Outcome>,
    endpoint: Option<Endpoint>,
    watchdog: Option<JoinHandle<()>>,
}

impl ApprovalServer {
    /// Server resolved up front without a listener (auto-deny and similar)
    pub fn resolved(session: ApprovalSession, outcome: Outcome) -> Self {
        let expires_at = session.expires_at();
        let (resolver, receiver) = Resolver::new();
        resolver.resolve(outcome);

        Self {
            session: Arc::new(session),
            expires_at,
            resolver,
            receiver,
            endpoint: None,
            watchdog: None,
        }
    }

    /// Base URL of the listener, e.g. `http://127.0.0.1:43121/`
    pub fn url(&self) -> Option<String> {
        self.endpoint
            .as_ref()
            .map(|endpoint| format!("http://{}/", endpoint.addr))
    }

    /// Landing page URL including the session token
    pub fn approval_url(&self) -> Option<&str> {
        self.endpoint
            .as_ref()
            .map(|endpoint| endpoint.approval_url.as_str())
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn session(&self) -> &ApprovalSession {
        &self.session
    }

    /// Outcome recorded so far, without blocking
    pub fn outcome(&self) -> Option<Outcome> {
        self.resolver.outcome()
    }

    /// Block until the session resolves, tear the listener down and report.
    ///
    /// `Ok(())` means approved. Denial, expiry and cancellation each map to
    /// their own [`ApprovalError`] variant.
    pub async fn wait(mut self) -> Result<(), ApprovalError> {
        let outcome = match (&mut self.receiver).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(ApprovalError::Server(
                    "approval resolver dropped without an outcome".to_string(),
                ));
            }
        };

        if let Some(endpoint) = self.endpoint.as_mut() {
            if tokio::time::timeout(TEARDOWN_GRACE, &mut endpoint.task)
                .await
                .is_err()
            {
                tracing::debug!("approval listener slow to drain, aborting");
                endpoint.task.abort();
                let _ = (&mut endpoint.task).await;
            }
        }
        if let Some(watchdog) = self.watchdog.as_ref() {
            watchdog.abort();
        }

        tracing::info!(
            scope = %self.session.scope,
            operation = %self.session.operation,
            %outcome,
            "approval session finished"
        );
        outcome.into_result()
    }
}

impl Drop for ApprovalServer {
    fn drop(&mut self) {
        self.resolver.resolve(Outcome::Cancelled);
        if let Some(endpoint) = self.endpoint.as_ref() {
            endpoint.task.abort();
        }
        if let Some(watchdog) = self.watchdog.as_ref() {
            watchdog.abort();
        }
    }
}

/// Bind a loopback listener for `session` and start serving immediately.
///
/// Returns as soon as the listener is up so the caller can print the URL.
/// `cancel` resolves the session as cancelled; reaching the policy expiry
/// resolves it as expired.
pub async fn start_browser_approval(
    cancel: CancellationToken,
    session: ApprovalSession,
) -> Result<ApprovalServer, ApprovalError> {
    let expires_at = session.expires_at();
    let session = Arc::new(session);
    let (resolver, receiver) = Resolver::new();
    let token = generate_token();

    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .map_err(ApprovalError::Bind)?;
    let addr = listener.local_addr().map_err(ApprovalError::Bind)?;
    let approval_url = format!("http://{}/session/{}", addr, token);

    let state = ServerState {
        session: Arc::clone(&session),
        token: Arc::from(token.as_str()),
        expires_at,
        resolver: Arc::clone(&resolver),
    };

    let shutdown = resolver.shutdown_token();
    let app = router(state);
    let task = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "approval listener failed");
        }
    });

    let watchdog = spawn_watchdog(Arc::clone(&resolver), cancel, expires_at);

    tracing::info!(
        %addr,
        scope = %session.scope,
        operation = %session.operation,
        policy = %session.policy.name,
        expires_at = %expires_at.to_rfc3339(),
        "approval server listening"
    );

    Ok(ApprovalServer {
        session,
        expires_at,
        resolver,
        receiver,
        endpoint: Some(Endpoint {
            addr,
            approval_url,
            task,
        }),
        watchdog: Some(watchdog),
    })
}

fn spawn_watchdog(
    resolver: Arc<Resolver>,
    cancel: CancellationToken,
    expires_at: DateTime<Utc>,
) -> JoinHandle<()> {
    let remaining = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    let deadline = tokio::time::Instant::now() + remaining;
    let shutdown = resolver.shutdown_token();

    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                resolver.resolve(Outcome::Expired);
            }
            _ = cancel.cancelled() => {
                resolver.resolve(Outcome::Cancelled);
            }
            _ = shutdown.cancelled() => {}
        }
    })
}

fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/session/:token", get(landing))
        .route("/session/:token/approve", post(approve))
        .route("/session/:token/deny", post(deny))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html("<p>guardian approval server. Open the approval link printed in your terminal.</p>")
}

async fn landing(State(st): State<ServerState>, Path(token): Path<String>) -> Response {
    if !tokens_match(&token, &st.token) {
        return unknown_session();
    }
    Html(page::landing(
        &st.session,
        &st.token,
        st.expires_at,
        st.resolver.outcome(),
    ))
    .into_response()
}

async fn approve(State(st): State<ServerState>, Path(token): Path<String>) -> Response {
    act(&st, &token, Outcome::Approved)
}

async fn deny(State(st): State<ServerState>, Path(token): Path<String>) -> Response {
    act(&st, &token, Outcome::Denied)
}

fn act(st: &ServerState, token: &str, requested: Outcome) -> Response {
    if !tokens_match(token, &st.token) {
        return unknown_session();
    }

    // Clicks at or after the deadline count as no response
    let outcome = if Utc::now() >= st.expires_at {
        Outcome::Expired
    } else {
        requested
    };

    let accepted = st.resolver.resolve(outcome);
    let recorded = st.resolver.outcome().unwrap_or(outcome);
    tracing::debug!(requested = %requested, %recorded, accepted, "approval action received");

    (
        [(header::CONNECTION, "close")],
        Html(page::result(&st.session, recorded, accepted)),
    )
        .into_response()
}

fn unknown_session() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONNECTION, "close")],
        "unknown approval session",
    )
        .into_response()
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn tokens_match(given: &str, expected: &str) -> bool {
    given.len() == expected.len()
        && given
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
