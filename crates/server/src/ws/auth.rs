// Connection authentication.
//
// A connection authenticates once and stays authenticated: the token is
// located at most once per frame (session attributes first, then frame
// headers), validated, and cached on the connection so later frames skip
// the lookup entirely. Missing or invalid tokens never fail the frame —
// the connection simply proceeds unauthenticated, and handlers that
// require an identity enforce it themselves.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use tabula_common::protocol::frame::ClientFrame;
use tracing::debug;
use uuid::Uuid;

use crate::auth::jwt::{Identity, TokenService};
use crate::auth::middleware::extract_bearer_token;

/// Per-connection authentication state, exclusively owned by the
/// connection's frame-handling task. UNAUTHENTICATED -> AUTHENTICATED is
/// one-way; a connection never reverts.
#[derive(Debug)]
pub struct ConnectionState {
    pub connection_id: Uuid,
    identity: Option<Identity>,
    cached_token: Option<String>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::with_session_token(None)
    }

    /// Seed the session attributes from the pre-upgrade handshake check.
    pub fn with_session_token(token: Option<String>) -> Self {
        Self { connection_id: Uuid::new_v4(), identity: None, cached_token: token }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn cached_token(&self) -> Option<&str> {
        self.cached_token.as_deref()
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Authenticate the channel-open frame. Token lookup order: session
/// attributes, `Authorization` header, then a `token=` key inside a raw
/// `query` header (for transports that cannot set custom headers). The
/// first token found is the one validated — an invalid first hit does
/// not fall through to later sources.
pub fn authenticate_on_open(
    state: &mut ConnectionState,
    frame: &ClientFrame,
    tokens: &TokenService,
) {
    let token = state
        .cached_token
        .clone()
        .or_else(|| bearer_from_frame(frame).map(ToOwned::to_owned))
        .or_else(|| {
            frame.header("query").and_then(token_from_query).map(ToOwned::to_owned)
        });

    match token {
        Some(token) => resolve(state, &token, tokens),
        None => debug!(connection_id = %state.connection_id, "no token presented on connect"),
    }
}

/// Re-validate silently on a non-open frame. Already-authenticated
/// connections pass through unchanged; otherwise the session attributes
/// and the `Authorization` header are consulted.
pub fn authenticate_on_frame(
    state: &mut ConnectionState,
    frame: &ClientFrame,
    tokens: &TokenService,
) {
    if state.identity.is_some() {
        return;
    }

    let token = state
        .cached_token
        .clone()
        .or_else(|| bearer_from_frame(frame).map(ToOwned::to_owned));

    if let Some(token) = token {
        resolve(state, &token, tokens);
    }
}

/// Pre-upgrade handshake check: look for a token in the request query
/// string or `Authorization` header and validate it. The upgrade always
/// proceeds; a validated token is returned so it can seed the
/// connection's session attributes.
pub fn handshake_session_token(
    query: Option<&str>,
    headers: &HeaderMap,
    tokens: &TokenService,
) -> Option<String> {
    let token = query
        .and_then(token_from_query)
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(extract_bearer_token)
        })?
        .to_owned();

    match tokens.validate(&token) {
        Ok(identity) => {
            debug!(username = %identity.username, "websocket handshake token accepted");
            Some(token)
        }
        Err(error) => {
            debug!(error = %error, "websocket handshake token rejected");
            None
        }
    }
}

fn resolve(state: &mut ConnectionState, token: &str, tokens: &TokenService) {
    match tokens.validate(token) {
        Ok(identity) => {
            debug!(
                connection_id = %state.connection_id,
                username = %identity.username,
                "connection authenticated"
            );
            state.identity = Some(identity);
            state.cached_token = Some(token.to_owned());
        }
        Err(error) => {
            debug!(
                connection_id = %state.connection_id,
                error = %error,
                "token validation failed, connection stays unauthenticated"
            );
        }
    }
}

fn bearer_from_frame(frame: &ClientFrame) -> Option<&str> {
    frame.header("Authorization").and_then(extract_bearer_token)
}

/// Extract the `token=` value from a raw query string.
pub fn token_from_query(query: &str) -> Option<&str> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{
        authenticate_on_frame, authenticate_on_open, handshake_session_token, token_from_query,
        ConnectionState,
    };
    use crate::auth::jwt::TokenService;
    use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue};
    use std::collections::HashMap;
    use tabula_common::protocol::frame::{ClientFrame, FrameCommand};
    use uuid::Uuid;

    const TEST_SECRET: &str = "tabula_test_secret_that_is_definitely_long_enough";

    fn token_service() -> TokenService {
        TokenService::new(TEST_SECRET).expect("service should initialize")
    }

    fn frame(command: FrameCommand, headers: &[(&str, String)]) -> ClientFrame {
        ClientFrame {
            command,
            headers: headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect::<HashMap<_, _>>(),
            destination: None,
            body: None,
        }
    }

    #[test]
    fn token_from_query_handles_positions_and_noise() {
        assert_eq!(token_from_query("token=abc"), Some("abc"));
        assert_eq!(token_from_query("a=1&token=abc&b=2"), Some("abc"));
        assert_eq!(token_from_query("token="), None);
        assert_eq!(token_from_query("session=abc"), None);
        assert_eq!(token_from_query(""), None);
    }

    #[test]
    fn connect_with_bearer_header_authenticates() {
        let tokens = token_service();
        let user_id = Uuid::new_v4();
        let token = tokens.issue(user_id, "alice").expect("token should be issued");

        let mut state = ConnectionState::new();
        let open = frame(FrameCommand::Connect, &[("Authorization", format!("Bearer {token}"))]);
        authenticate_on_open(&mut state, &open, &tokens);

        let identity = state.identity().expect("connection should be authenticated");
        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.username, "alice");
        assert_eq!(state.cached_token(), Some(token.as_str()));
    }

    #[test]
    fn connect_with_query_header_fallback_authenticates() {
        let tokens = token_service();
        let token = tokens.issue(Uuid::new_v4(), "alice").expect("token should be issued");

        let mut state = ConnectionState::new();
        let open =
            frame(FrameCommand::Connect, &[("query", format!("room=1&token={token}"))]);
        authenticate_on_open(&mut state, &open, &tokens);

        assert!(state.is_authenticated());
    }

    #[test]
    fn session_token_takes_precedence_over_headers() {
        let tokens = token_service();
        let session_token = tokens.issue(Uuid::new_v4(), "alice").expect("token should issue");
        let header_token = tokens.issue(Uuid::new_v4(), "mallory").expect("token should issue");

        let mut state = ConnectionState::with_session_token(Some(session_token));
        let open = frame(
            FrameCommand::Connect,
            &[("Authorization", format!("Bearer {header_token}"))],
        );
        authenticate_on_open(&mut state, &open, &tokens);

        let identity = state.identity().expect("connection should be authenticated");
        assert_eq!(identity.username, "alice");
    }

    #[test]
    fn invalid_token_leaves_the_connection_unauthenticated() {
        let tokens = token_service();

        let mut state = ConnectionState::new();
        let open = frame(
            FrameCommand::Connect,
            &[("Authorization", "Bearer garbage".to_string())],
        );
        authenticate_on_open(&mut state, &open, &tokens);

        assert!(!state.is_authenticated());
        assert!(state.cached_token().is_none());
    }

    #[test]
    fn absent_token_is_not_an_error() {
        let tokens = token_service();
        let mut state = ConnectionState::new();
        authenticate_on_open(&mut state, &frame(FrameCommand::Connect, &[]), &tokens);
        assert!(!state.is_authenticated());
    }

    #[test]
    fn later_frame_resolves_identity_from_cached_token() {
        let tokens = token_service();
        let token = tokens.issue(Uuid::new_v4(), "alice").expect("token should be issued");

        // Handshake seeded the token but the connect frame never came.
        let mut state = ConnectionState::with_session_token(Some(token));
        authenticate_on_frame(&mut state, &frame(FrameCommand::Send, &[]), &tokens);

        assert!(state.is_authenticated());
    }

    #[test]
    fn later_frame_resolves_identity_from_bearer_header() {
        let tokens = token_service();
        let token = tokens.issue(Uuid::new_v4(), "alice").expect("token should be issued");

        let mut state = ConnectionState::new();
        let send =
            frame(FrameCommand::Send, &[("Authorization", format!("Bearer {token}"))]);
        authenticate_on_frame(&mut state, &send, &tokens);

        assert!(state.is_authenticated());
    }

    #[test]
    fn authenticated_connections_never_revert() {
        let tokens = token_service();
        let token = tokens.issue(Uuid::new_v4(), "alice").expect("token should be issued");

        let mut state = ConnectionState::new();
        let open = frame(FrameCommand::Connect, &[("Authorization", format!("Bearer {token}"))]);
        authenticate_on_open(&mut state, &open, &tokens);
        assert!(state.is_authenticated());

        // A later frame with a bad header must not clear the identity.
        let send = frame(
            FrameCommand::Send,
            &[("Authorization", "Bearer garbage".to_string())],
        );
        authenticate_on_frame(&mut state, &send, &tokens);

        let identity = state.identity().expect("identity should persist");
        assert_eq!(identity.username, "alice");
    }

    #[test]
    fn handshake_accepts_query_token() {
        let tokens = token_service();
        let token = tokens.issue(Uuid::new_v4(), "alice").expect("token should be issued");

        let seeded = handshake_session_token(
            Some(&format!("token={token}")),
            &HeaderMap::new(),
            &tokens,
        );
        assert_eq!(seeded.as_deref(), Some(token.as_str()));
    }

    #[test]
    fn handshake_falls_back_to_authorization_header() {
        let tokens = token_service();
        let token = tokens.issue(Uuid::new_v4(), "alice").expect("token should be issued");

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header should build"),
        );

        let seeded = handshake_session_token(None, &headers, &tokens);
        assert_eq!(seeded.as_deref(), Some(token.as_str()));
    }

    #[test]
    fn handshake_rejects_invalid_tokens_but_does_not_fail() {
        let tokens = token_service();
        let seeded =
            handshake_session_token(Some("token=garbage"), &HeaderMap::new(), &tokens);
        assert!(seeded.is_none());
    }
}
