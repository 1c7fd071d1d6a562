pub mod auth;
pub mod request;
pub mod response;

// Re-exports for convenience
pub use auth::{AuthChallenge, ChallengeDisposition, Credential, ProtectionSpace};
pub use request::{Request, RequestBody};
pub use response::{CachedResponse, ResponseMeta, TaskMetrics};
