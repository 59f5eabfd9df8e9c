//! Shared OAuth credentials: device-code flow, refresh, and a credential
//! file coordinated across processes.

pub mod client;
pub mod device_code;
pub mod error;
pub mod lock;
pub mod manager;
pub mod source;
pub mod store;
pub mod timer;
pub mod token;

pub use client::DeviceFlowClient;
pub use device_code::{DeviceAuthorization, DeviceFlowOutcome, DeviceFlowState, TokenErrorCode};
pub use error::AuthError;
pub use lock::{CrossProcessLock, LockFile, LockGuard};
pub use manager::{SharedTokenManager, TokenClient};
pub use source::{credential_source, CredentialSource, StaticKeySource};
pub use store::CredentialStore;
pub use timer::{Clock, ManualClock, PollTimer, SystemClock, TokioTimer, Wait};
pub use token::Credential;
