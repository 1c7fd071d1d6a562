//! Authentication challenges and the credentials that answer them.

use zeroize::Zeroizing;

/// Authentication scheme named by a `WWW-Authenticate` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// Basic authentication (base64 encoded)
    Basic,
    /// Digest authentication (challenge-response)
    Digest,
    /// Anything else the server offered
    Other,
}

/// Host, port, realm and scheme a challenge applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionSpace {
    pub host: String,
    pub port: u16,
    pub realm: Option<String>,
    pub scheme: AuthScheme,
}

impl ProtectionSpace {
    /// Parse a `WWW-Authenticate` value such as `Basic realm="api"`.
    pub fn from_header(host: impl Into<String>, port: u16, value: &str) -> Self {
        let value = value.trim();
        let (scheme_token, params) = value.split_once(' ').unwrap_or((value, ""));
        let scheme = match scheme_token.to_ascii_lowercase().as_str() {
            "basic" => AuthScheme::Basic,
            "digest" => AuthScheme::Digest,
            _ => AuthScheme::Other,
        };

        let realm = params.split(',').find_map(|param| {
            let (key, val) = param.trim().split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("realm")
                .then(|| val.trim().trim_matches('"').to_string())
        });

        Self { host: host.into().to_lowercase(), port, realm, scheme }
    }
}

/// A challenge raised by the server, offered to delegates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub protection_space: ProtectionSpace,
    /// How many credentials were already rejected for this task.
    pub previous_failure_count: u32,
}

/// Username and password. The password is wiped on drop.
#[derive(Clone)]
pub struct Credential {
    username: String,
    password: Zeroizing<String>,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: Zeroizing::new(password.into()) }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Generate the `Authorization` header value for Basic auth.
    pub fn to_basic_header_value(&self) -> String {
        use base64::{engine::general_purpose, Engine as _};
        let creds = Zeroizing::new(format!("{}:{}", self.username, self.password.as_str()));
        let encoded = general_purpose::STANDARD.encode(creds.as_bytes());
        format!("Basic {}", encoded)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How a delegate answers a challenge.
#[derive(Debug, Clone)]
pub enum ChallengeDisposition {
    /// Retry the request with this credential.
    UseCredential(Credential),
    /// Let the engine do what it would do with no delegate.
    PerformDefaultHandling,
    /// Fail the task.
    CancelAuthenticationChallenge,
    /// Skip this protection space; the engine treats the response as final.
    RejectProtectionSpace,
}
