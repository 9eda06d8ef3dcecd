pub mod crypto;
pub mod diff;
pub mod distribution;
pub mod github;
pub mod llm;
pub mod mailer;
pub mod notes;
pub mod oauth_state;
pub mod orchestrator;
pub mod releases;
pub mod signature;

pub use crypto::{CredentialCipher, CryptoError};
pub use diff::{extract_pr_numbers, DiffAggregator, DiffError};
pub use distribution::{notes_for_audience, Distributor};
pub use github::{GitHubClient, HostCommit, HostError, HostPull, HostRelease, HostRepo, ReleaseHost};
pub use llm::{ChatMessage, Completion, CompletionBackend, CompletionError, OpenAiClient, Role};
pub use mailer::{HttpMailer, MailError, Mailer};
pub use notes::{GenerationError, NoteGenerator};
pub use oauth_state::{OAuthState, OAuthStateStore};
pub use orchestrator::{OrchestratorError, ReleaseOrchestrator, WebhookOutcome};
pub use releases::{ReleaseStore, StoreError};
pub use signature::{generate_secret, WebhookVerifier};
