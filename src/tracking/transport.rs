//! RPC transports for the Supabase collaborator.
//!
//! Remote procedures are reached through the PostgREST RPC endpoint. Two
//! strategies exist: the service's own anon-key credential, and a raw call
//! carrying the patient's session token. Callers try them in order and use
//! the error class to decide whether advancing to the next one is credible.

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The backend does not know the function or its argument name.
    #[error("unknown rpc function or argument: {0}")]
    FunctionMismatch(String),
    /// The credential was rejected (API key or session).
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
    #[error("http {status}: {message}")]
    Status { status: u16, message: String },
    #[error("network: {0}")]
    Network(#[from] reqwest::Error),
}

impl TransportError {
    pub fn is_function_mismatch(&self) -> bool {
        matches!(self, TransportError::FunctionMismatch(_))
    }

    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, TransportError::AuthRejected(_))
    }

    pub fn is_bad_request(&self) -> bool {
        matches!(self, TransportError::Status { status: 400, .. })
    }
}

#[async_trait]
pub trait RpcTransport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Invoke a remote procedure with a JSON argument object. `session` is
    /// the caller's bearer token, used only by transports that forward it.
    async fn call(
        &self,
        function: &str,
        args: &Value,
        session: Option<&str>,
    ) -> Result<Value, TransportError>;
}

/// Primary transport: PostgREST RPC authenticated with the service anon key.
pub struct SupabaseRpc {
    http: reqwest::Client,
    rpc_base: String,
    anon_key: String,
}

impl SupabaseRpc {
    pub fn new(http: reqwest::Client, rpc_base: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            http,
            rpc_base: rpc_base.into(),
            anon_key: anon_key.into(),
        }
    }
}

#[async_trait]
impl RpcTransport for SupabaseRpc {
    fn name(&self) -> &'static str {
        "supabase-rpc"
    }

    async fn call(
        &self,
        function: &str,
        args: &Value,
        _session: Option<&str>,
    ) -> Result<Value, TransportError> {
        post_rpc(&self.http, &self.rpc_base, &self.anon_key, &self.anon_key, function, args).await
    }
}

/// Fallback transport: the same REST RPC endpoint, but the request runs as
/// the patient by forwarding their session token.
pub struct SessionRestRpc {
    http: reqwest::Client,
    rpc_base: String,
    anon_key: String,
}

impl SessionRestRpc {
    pub fn new(http: reqwest::Client, rpc_base: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            http,
            rpc_base: rpc_base.into(),
            anon_key: anon_key.into(),
        }
    }
}

#[async_trait]
impl RpcTransport for SessionRestRpc {
    fn name(&self) -> &'static str {
        "session-rest"
    }

    async fn call(
        &self,
        function: &str,
        args: &Value,
        session: Option<&str>,
    ) -> Result<Value, TransportError> {
        let bearer = session.unwrap_or(&self.anon_key);
        post_rpc(&self.http, &self.rpc_base, &self.anon_key, bearer, function, args).await
    }
}

async fn post_rpc(
    http: &reqwest::Client,
    rpc_base: &str,
    anon_key: &str,
    bearer: &str,
    function: &str,
    args: &Value,
) -> Result<Value, TransportError> {
    let url = format!("{}/{}", rpc_base.trim_end_matches('/'), function);

    let response = http
        .post(&url)
        .header("apikey", anon_key)
        .bearer_auth(bearer)
        .json(args)
        .send()
        .await?;

    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<Value>().await?);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_failure(status.as_u16(), &body))
}

/// Map a PostgREST failure onto the classes the retry policy cares about.
fn classify_failure(status: u16, body: &str) -> TransportError {
    let message = postgrest_error_message(body);

    // PGRST202 is "Could not find the function ... in the schema cache":
    // the function name or argument name does not match the deployed schema.
    if body.contains("PGRST202")
        || (status == 404 && body.contains("function"))
        || (status == 400 && body.contains("function") && body.contains("does not exist"))
    {
        return TransportError::FunctionMismatch(message);
    }

    if status == 401
        || status == 403
        || body.contains("Invalid API key")
        || body.contains("JWSError")
    {
        return TransportError::AuthRejected(message);
    }

    TransportError::Status { status, message }
}

/// Human-readable failure text from a PostgREST error body, composing the
/// message/code/details/hint fields when present.
pub fn postgrest_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return truncate(body);
    };

    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };

    let Some(message) = field("message") else {
        return truncate(body);
    };

    let mut text = message.to_string();
    if let Some(code) = field("code") {
        text.push_str(&format!(" [{}]", code));
    }
    if let Some(details) = field("details") {
        text.push_str(&format!(": {}", details));
    }
    if let Some(hint) = field("hint") {
        text.push_str(&format!(" ({})", hint));
    }
    text
}

fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}
