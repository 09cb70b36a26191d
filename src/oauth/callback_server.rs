//! Loopback redirect listener.
//!
//! When the redirect URI points at `http://127.0.0.1`, `http://[::1]` or
//! `http://localhost`, the
//! browser delivers the callback to a port on this machine. [`CallbackServer`]
//! binds that port, waits for one request on the redirect path, and hands the
//! full redirected URI back to the caller. It does not look at `code` or
//! `state`; judging the callback is the flow controller's job.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use oauth2client::oauth::callback_server::CallbackServer;
//!
//! let server = CallbackServer::for_redirect(&config.redirect_uri).expect("loopback redirect");
//! let handle = server.start().await?;
//!
//! open::that(flow.begin_authorization())?;
//!
//! let uri = handle.wait(Duration::from_secs(300)).await?;
//! let credential = flow.handle_callback(&uri).await?;
//! ```
//!
//! # Security
//!
//! - Only binds loopback addresses; `localhost` binds both `127.0.0.1` and
//!   `::1` so the browser reaches it whichever address it resolves first
//! - Shuts down after one callback or when the wait times out

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::Uri, response::Html, routing::get, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch, Mutex};
use tracing::{debug, error, info, warn};
use url::{Host, Url};

const RECEIVED_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Authorization received</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 4em;">
<h1>Authorization response received</h1>
<p>You can close this window and return to the application.</p>
</body>
</html>"#;

/// Errors from the loopback listener.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ListenerError {
    /// The port could not be bound.
    #[error("failed to start callback listener on port {port}: {source}")]
    Bind {
        /// Requested port.
        port: u16,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// No redirect arrived in time.
    #[error("no authorization callback within {} seconds", .0.as_secs())]
    Timeout(Duration),

    /// The listener stopped before relaying a callback.
    #[error("callback listener stopped unexpectedly")]
    Closed,
}

struct ServerState {
    result_tx: Mutex<Option<oneshot::Sender<String>>>,
    redirect: Url,
}

/// One-shot HTTP listener for a loopback redirect URI.
#[derive(Debug, Clone)]
pub struct CallbackServer {
    redirect: Url,
    port: u16,
    addrs: Vec<IpAddr>,
}

/// Loopback addresses serving `redirect_uri`, or `None` if the URI is not an
/// `http` loopback redirect.
///
/// The first address is required; the rest are bound when available.
pub fn loopback_addrs(redirect_uri: &Url) -> Option<Vec<IpAddr>> {
    if redirect_uri.scheme() != "http" {
        return None;
    }
    match redirect_uri.host()? {
        Host::Ipv4(ip) if ip.is_loopback() => Some(vec![IpAddr::V4(ip)]),
        Host::Ipv6(ip) if ip.is_loopback() => Some(vec![IpAddr::V6(ip)]),
        Host::Domain(name) if name.eq_ignore_ascii_case("localhost") => Some(vec![
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(Ipv6Addr::LOCALHOST),
        ]),
        _ => None,
    }
}

impl CallbackServer {
    /// Create a listener for `redirect_uri` if it is an `http` loopback URI.
    pub fn for_redirect(redirect_uri: &Url) -> Option<Self> {
        let addrs = loopback_addrs(redirect_uri)?;
        let port = redirect_uri.port_or_known_default()?;
        Some(Self {
            redirect: redirect_uri.clone(),
            port,
            addrs,
        })
    }

    /// Port the listener will bind. `0` picks a free port at start.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Addresses the listener will bind.
    pub fn addrs(&self) -> &[IpAddr] {
        &self.addrs
    }

    /// Bind and start serving. Returns once the port is bound.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Bind`] if the port is unavailable on the
    /// primary address.
    pub async fn start(self) -> Result<CallbackHandle, ListenerError> {
        let bind_error = |port: u16| {
            move |source: std::io::Error| {
                error!(port, error = %source, "Failed to bind callback listener");
                ListenerError::Bind { port, source }
            }
        };

        let (primary, secondary) = self.addrs.split_first().ok_or(ListenerError::Closed)?;
        let first = TcpListener::bind(SocketAddr::new(*primary, self.port))
            .await
            .map_err(bind_error(self.port))?;
        let port = first
            .local_addr()
            .map_err(bind_error(self.port))?
            .port();

        let mut listeners = vec![first];
        for ip in secondary {
            // Same port as the primary so one redirect URI reaches either.
            match TcpListener::bind(SocketAddr::new(*ip, port)).await {
                Ok(listener) => listeners.push(listener),
                Err(e) => warn!(%ip, port, error = %e, "Skipping loopback address"),
            }
        }

        let mut redirect = self.redirect;
        if redirect.port_or_known_default() != Some(port) {
            // Only reachable when port 0 asked the OS to pick one.
            let _ = redirect.set_port(Some(port));
        }

        let (result_tx, result_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let state = Arc::new(ServerState {
            result_tx: Mutex::new(Some(result_tx)),
            redirect: redirect.clone(),
        });

        let app = Router::new()
            .route(redirect.path(), get(handle_redirect))
            .with_state(state);

        info!(
            port,
            path = redirect.path(),
            listeners = listeners.len(),
            "Callback listener started"
        );

        for listener in listeners {
            let app = app.clone();
            let mut shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown_rx.wait_for(|stop| *stop).await;
                        debug!(port, "Callback listener shutdown requested");
                    })
                    .await
                    .map_err(|e| error!(error = %e, "Callback listener error"))
            });
        }

        Ok(CallbackHandle {
            result_rx,
            shutdown_tx,
            redirect,
        })
    }
}

/// Handle for a running listener. Dropping it stops the listener.
pub struct CallbackHandle {
    result_rx: oneshot::Receiver<String>,
    shutdown_tx: watch::Sender<bool>,
    redirect: Url,
}

impl CallbackHandle {
    /// Redirect URI actually served, with the bound port.
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect
    }

    /// Port the listener is bound to.
    pub fn port(&self) -> u16 {
        self.redirect.port_or_known_default().unwrap_or_default()
    }

    /// Wait for the redirect and return the full URI the browser requested.
    ///
    /// # Errors
    ///
    /// [`ListenerError::Timeout`] if nothing arrives within `timeout`,
    /// [`ListenerError::Closed`] if the listener died first.
    pub async fn wait(mut self, timeout: Duration) -> Result<String, ListenerError> {
        let result = tokio::select! {
            result = &mut self.result_rx => result.map_err(|_| ListenerError::Closed),
            _ = tokio::time::sleep(timeout) => {
                warn!(timeout_secs = timeout.as_secs(), "Authorization callback timed out");
                Err(ListenerError::Timeout(timeout))
            }
        };
        self.shutdown();
        info!(success = result.is_ok(), "Callback listener stopped");
        result
    }

    fn shutdown(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn handle_redirect(State(state): State<Arc<ServerState>>, uri: Uri) -> Html<&'static str> {
    let mut full = state.redirect.clone();
    full.set_query(uri.query());

    match state.result_tx.lock().await.take() {
        Some(tx) => {
            debug!("Relaying authorization callback");
            let _ = tx.send(full.into());
        }
        None => debug!("Callback already relayed; ignoring repeat request"),
    }

    Html(RECEIVED_HTML)
}
