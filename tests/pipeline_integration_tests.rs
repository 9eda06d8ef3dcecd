//! End-to-End Pipeline Integration Tests
//!
//! These tests drive the release orchestrator against a real database with
//! in-memory collaborators for the source host and the completion provider,
//! plus a local HTTP receiver for chat webhooks.
//!
//! Run with: `cargo test --test pipeline_integration_tests -- --ignored`

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::{web, App, HttpResponse, HttpServer};
use async_trait::async_trait;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use shipnotes::models::{ChannelKind, EditNotesRequest, ReleaseStatus};
use shipnotes::services::{
    ChatMessage, Completion, CompletionBackend, CompletionError, CredentialCipher, HostCommit,
    HostError, HostPull, HostRelease, HostRepo, MailError, Mailer, ReleaseHost,
    ReleaseOrchestrator, ReleaseStore, WebhookVerifier,
};
use shipnotes::{Audience, WebhookOutcome};

// ============================================================================
// Test Helpers
// ============================================================================

/// Helper to create a test database pool - returns None if connection fails
async fn try_create_test_pool() -> Option<PgPool> {
    let _ = dotenvy::dotenv();
    let database_url = std::env::var("DATABASE_URL").ok()?;

    sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .ok()
}

fn test_cipher() -> CredentialCipher {
    CredentialCipher::from_hex_key(&"42".repeat(32)).expect("cipher")
}

/// In-memory source host with configurable releases, commits, and pulls.
#[derive(Default)]
struct FakeHost {
    releases: Vec<HostRelease>,
    commits: Vec<HostCommit>,
    pulls: HashMap<u64, HostPull>,
}

#[async_trait]
impl ReleaseHost for FakeHost {
    async fn release_by_tag(
        &self,
        _token: &str,
        _owner: &str,
        _repo: &str,
        tag: &str,
    ) -> Result<Option<HostRelease>, HostError> {
        Ok(self.releases.iter().find(|r| r.tag_name == tag).cloned())
    }

    async fn list_releases(
        &self,
        _token: &str,
        _owner: &str,
        _repo: &str,
        per_page: u32,
    ) -> Result<Vec<HostRelease>, HostError> {
        Ok(self
            .releases
            .iter()
            .take(per_page as usize)
            .cloned()
            .collect())
    }

    async fn compare_commits(
        &self,
        _token: &str,
        _owner: &str,
        _repo: &str,
        _base: &str,
        _head: &str,
    ) -> Result<Vec<HostCommit>, HostError> {
        Ok(self.commits.clone())
    }

    async fn pull_request(
        &self,
        _token: &str,
        _owner: &str,
        _repo: &str,
        number: u64,
    ) -> Result<HostPull, HostError> {
        self.pulls.get(&number).cloned().ok_or(HostError::Server {
            status: 404,
            body: "not found".to_string(),
        })
    }

    async fn create_release_webhook(
        &self,
        _token: &str,
        _owner: &str,
        _repo: &str,
        _callback_url: &str,
        _secret: &str,
    ) -> Result<i64, HostError> {
        Ok(100)
    }

    async fn delete_webhook(
        &self,
        _token: &str,
        _owner: &str,
        _repo: &str,
        _hook_id: i64,
    ) -> Result<(), HostError> {
        Ok(())
    }

    async fn list_viewer_repos(&self, _token: &str) -> Result<Vec<HostRepo>, HostError> {
        Ok(Vec::new())
    }
}

/// Completion backend that echoes per-call text and can be told to fail for
/// prompts mentioning a particular tag.
struct FakeBackend {
    calls: Mutex<u32>,
    fail_for_tag: Option<String>,
}

impl FakeBackend {
    fn new() -> Self {
        Self {
            calls: Mutex::new(0),
            fail_for_tag: None,
        }
    }

    fn failing_for(tag: &str) -> Self {
        Self {
            calls: Mutex::new(0),
            fail_for_tag: Some(tag.to_string()),
        }
    }
}

#[async_trait]
impl CompletionBackend for FakeBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, CompletionError> {
        if let Some(tag) = &self.fail_for_tag {
            if messages.iter().any(|m| m.content.contains(tag.as_str())) {
                return Err(CompletionError::Server {
                    status: 500,
                    body: "model unavailable".to_string(),
                });
            }
        }
        let call = {
            let mut calls = self.calls.lock().expect("calls lock");
            *calls += 1;
            *calls
        };
        Ok(Completion {
            text: format!("## Release notes\nGenerated document {call}."),
            tokens_used: 100,
            model: "test-model-1".to_string(),
        })
    }
}

/// Mailer that never sends; email targets are not under test here.
struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), MailError> {
        Ok(())
    }
}

fn release(tag: &str) -> HostRelease {
    HostRelease {
        tag_name: tag.to_string(),
        name: Some(tag.to_string()),
        body: Some(format!("Release {tag}")),
        html_url: Some(format!("https://example.test/releases/{tag}")),
    }
}

fn acme_host() -> FakeHost {
    FakeHost {
        releases: vec![release("v1.2.0"), release("v1.1.0")],
        commits: vec![
            HostCommit {
                sha: "c1".to_string(),
                message: "Improve onboarding copy".to_string(),
                author_name: Some("Jo Doe".to_string()),
                author_login: Some("jodoe".to_string()),
            },
            HostCommit {
                sha: "c2".to_string(),
                message: "Speed up sync".to_string(),
                author_name: Some("Sam Lee".to_string()),
                author_login: None,
            },
            HostCommit {
                sha: "c3".to_string(),
                message: "Fix login flow (#42)".to_string(),
                author_name: None,
                author_login: Some("octocat".to_string()),
            },
        ],
        pulls: HashMap::from([(
            42,
            HostPull {
                number: 42,
                title: "Fix login flow".to_string(),
                body: Some("Resolves the redirect loop.".to_string()),
                labels: vec!["bug".to_string()],
                author_login: Some("octocat".to_string()),
            },
        )]),
    }
}

fn build_orchestrator(
    pool: &PgPool,
    host: Arc<dyn ReleaseHost>,
    backend: Arc<dyn CompletionBackend>,
) -> ReleaseOrchestrator {
    ReleaseOrchestrator::new(
        ReleaseStore::new(pool.clone()),
        test_cipher(),
        host,
        backend,
        Arc::new(NoopMailer),
        Duration::from_secs(2),
    )
}

async fn connect_repo(pool: &PgPool, secret: &str) -> (Uuid, String) {
    let full_name = format!("acme/{}", Uuid::new_v4());
    let store = ReleaseStore::new(pool.clone());
    let ciphertext = test_cipher().encrypt("host-token").expect("encrypt");
    let subscription = store
        .insert_subscription(&full_name, secret, &ciphertext, &Default::default())
        .await
        .expect("insert subscription");
    (subscription.repo_id, full_name)
}

async fn cleanup_repo(pool: &PgPool, repo_id: Uuid) {
    let _ = sqlx::query("DELETE FROM repositories WHERE repo_id = $1")
        .bind(repo_id)
        .execute(pool)
        .await;
}

fn signed_webhook(full_name: &str, tag: &str, secret: &str) -> (Vec<u8>, String) {
    let payload = serde_json::to_vec(&json!({
        "action": "published",
        "release": {"tag_name": tag, "html_url": format!("https://example.test/releases/{tag}")},
        "repository": {"full_name": full_name},
    }))
    .expect("payload");
    let signature = WebhookVerifier::new().sign(&payload, secret);
    (payload, signature)
}

/// Spin up a local chat-webhook receiver with a succeeding and a failing
/// route; returns its base URL.
async fn spawn_chat_receiver() -> String {
    let server = HttpServer::new(|| {
        App::new()
            .route(
                "/hooks/ok",
                web::post().to(|| async { HttpResponse::Ok().body("ok") }),
            )
            .route(
                "/hooks/broken",
                web::post().to(|| async {
                    HttpResponse::InternalServerError().body("upstream exploded")
                }),
            )
    })
    .workers(1)
    .disable_signals()
    .bind(("127.0.0.1", 0))
    .expect("bind receiver");
    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());
    format!("http://{addr}")
}

// ============================================================================
// Tests
// ============================================================================

// Full webhook path: signature, aggregation, generation, fan-out with one
// failing chat target, and final state.
#[ignore]
#[actix_web::test]
async fn webhook_end_to_end_with_partial_delivery_failure() {
    let Some(pool) = try_create_test_pool().await else {
        eprintln!("Skipping test: database not available");
        return;
    };

    let secret = "s3cr3t";
    let (repo_id, full_name) = connect_repo(&pool, secret).await;
    let store = ReleaseStore::new(pool.clone());

    let base = spawn_chat_receiver().await;
    store
        .insert_channel(
            repo_id,
            ChannelKind::Chat,
            Audience::Customer,
            &format!("{base}/hooks/ok"),
        )
        .await
        .expect("insert channel");
    store
        .insert_channel(
            repo_id,
            ChannelKind::Chat,
            Audience::Developer,
            &format!("{base}/hooks/broken"),
        )
        .await
        .expect("insert channel");

    let orchestrator = build_orchestrator(&pool, Arc::new(acme_host()), Arc::new(FakeBackend::new()));
    let (payload, signature) = signed_webhook(&full_name, "v1.2.0", secret);

    let outcome = orchestrator
        .handle_webhook(Some("release"), Some(&signature), &payload)
        .await
        .expect("handle webhook");

    let release_id = match outcome {
        WebhookOutcome::Processed {
            release_id,
            targets_attempted,
            targets_delivered,
        } => {
            assert_eq!(targets_attempted, 5, "2 chat + 3 hosted targets");
            assert_eq!(targets_delivered, 4, "one chat target returns 500");
            release_id
        }
        other => panic!("expected Processed, got {other:?}"),
    };

    let release = store
        .find_release_by_id(release_id)
        .await
        .expect("find release")
        .expect("release exists");
    assert_eq!(release.status, ReleaseStatus::Published);
    assert_eq!(release.tag_name, "v1.2.0");

    let notes = store
        .find_notes(release_id)
        .await
        .expect("find notes")
        .expect("notes exist");
    assert!(!notes.customer_md.is_empty());
    assert!(!notes.developer_md.is_empty());
    assert!(!notes.stakeholder_md.is_empty());
    assert_eq!(notes.tokens_used, 300);
    assert_eq!(notes.model, "test-model-1");

    let outcomes = store.list_outcomes(release_id).await.expect("outcomes");
    assert_eq!(outcomes.len(), 5);
    assert_eq!(outcomes.iter().filter(|o| o.success).count(), 4);
    let failed: Vec<_> = outcomes.iter().filter(|o| !o.success).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].channel_kind, ChannelKind::Chat);
    assert!(failed[0]
        .error_detail
        .as_deref()
        .expect("detail")
        .contains("500"));

    cleanup_repo(&pool, repo_id).await;
}

// Processing the same delivery twice leaves exactly one release and does not
// re-run the fan-out.
#[ignore]
#[actix_web::test]
async fn duplicate_webhook_delivery_is_idempotent() {
    let Some(pool) = try_create_test_pool().await else {
        eprintln!("Skipping test: database not available");
        return;
    };

    let secret = "s3cr3t";
    let (repo_id, full_name) = connect_repo(&pool, secret).await;
    let store = ReleaseStore::new(pool.clone());

    let orchestrator = build_orchestrator(&pool, Arc::new(acme_host()), Arc::new(FakeBackend::new()));
    let (payload, signature) = signed_webhook(&full_name, "v1.2.0", secret);

    let first = orchestrator
        .handle_webhook(Some("release"), Some(&signature), &payload)
        .await
        .expect("first delivery");
    let first_id = match first {
        WebhookOutcome::Processed { release_id, .. } => release_id,
        other => panic!("expected Processed, got {other:?}"),
    };
    let outcomes_before = store.list_outcomes(first_id).await.expect("outcomes").len();

    let second = orchestrator
        .handle_webhook(Some("release"), Some(&signature), &payload)
        .await
        .expect("second delivery");
    match second {
        WebhookOutcome::Duplicate { release_id } => assert_eq!(release_id, first_id),
        other => panic!("expected Duplicate, got {other:?}"),
    }

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM releases WHERE repo_id = $1 AND tag_name = $2")
            .bind(repo_id)
            .bind("v1.2.0")
            .fetch_one(&pool)
            .await
            .expect("count");
    assert_eq!(count, 1, "exactly one persisted release");

    let outcomes_after = store.list_outcomes(first_id).await.expect("outcomes").len();
    assert_eq!(
        outcomes_before, outcomes_after,
        "duplicate delivery must not add outcomes"
    );

    cleanup_repo(&pool, repo_id).await;
}

// Aggregation failure marks the release failed and nothing is distributed.
#[ignore]
#[actix_web::test]
async fn missing_host_release_marks_release_failed() {
    let Some(pool) = try_create_test_pool().await else {
        eprintln!("Skipping test: database not available");
        return;
    };

    let secret = "s3cr3t";
    let (repo_id, full_name) = connect_repo(&pool, secret).await;
    let store = ReleaseStore::new(pool.clone());

    // Host knows nothing about the tag in the payload.
    let orchestrator = build_orchestrator(
        &pool,
        Arc::new(FakeHost::default()),
        Arc::new(FakeBackend::new()),
    );
    let (payload, signature) = signed_webhook(&full_name, "v9.9.9", secret);

    let result = orchestrator
        .handle_webhook(Some("release"), Some(&signature), &payload)
        .await;
    assert!(result.is_err(), "aggregation failure surfaces to the caller");

    let release = store
        .find_release(repo_id, "v9.9.9")
        .await
        .expect("find release")
        .expect("release row exists");
    assert_eq!(release.status, ReleaseStatus::Failed);
    assert!(release
        .error_message
        .as_deref()
        .expect("error recorded")
        .contains("v9.9.9"));

    let outcomes = store
        .list_outcomes(release.release_id)
        .await
        .expect("outcomes");
    assert!(outcomes.is_empty(), "failed releases are not distributed");

    cleanup_repo(&pool, repo_id).await;
}

// Backfill: existing tags are skipped, one failing tag is reported, the rest
// import and end up published with a synthetic hosted outcome.
#[ignore]
#[actix_web::test]
async fn backfill_isolates_per_tag_failures() {
    let Some(pool) = try_create_test_pool().await else {
        eprintln!("Skipping test: database not available");
        return;
    };

    let secret = "s3cr3t";
    let (repo_id, _full_name) = connect_repo(&pool, secret).await;
    let store = ReleaseStore::new(pool.clone());

    let host = FakeHost {
        releases: vec![
            release("v0.4.0"),
            release("v0.3.0"),
            release("v0.2.0"),
            release("v0.1.0"),
        ],
        ..Default::default()
    };
    // Generation blows up only for v0.2.0.
    let orchestrator = build_orchestrator(
        &pool,
        Arc::new(host),
        Arc::new(FakeBackend::failing_for("v0.2.0")),
    );

    // v0.3.0 is already present and must be skipped silently.
    store
        .insert_release(repo_id, "v0.3.0", None, ReleaseStatus::Published)
        .await
        .expect("preexisting release");

    let report = orchestrator.backfill(repo_id, 4).await.expect("backfill");

    assert_eq!(report.imported, vec!["v0.4.0", "v0.1.0"]);
    assert_eq!(report.skipped, vec!["v0.3.0"]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].tag_name, "v0.2.0");

    let imported = store
        .find_release(repo_id, "v0.4.0")
        .await
        .expect("find")
        .expect("imported release");
    assert_eq!(imported.status, ReleaseStatus::Published);

    let outcomes = store
        .list_outcomes(imported.release_id)
        .await
        .expect("outcomes");
    assert_eq!(outcomes.len(), 1, "synthetic hosted outcome only");
    assert_eq!(outcomes[0].channel_kind, ChannelKind::Hosted);
    assert!(outcomes[0].success);

    let failed = store
        .find_release(repo_id, "v0.2.0")
        .await
        .expect("find")
        .expect("failed release row");
    assert_eq!(failed.status, ReleaseStatus::Failed);

    cleanup_repo(&pool, repo_id).await;
}

// Regeneration preserves edited audiences unless forced; a forced run clears
// every edited flag.
#[ignore]
#[actix_web::test]
async fn regeneration_respects_edited_flags() {
    let Some(pool) = try_create_test_pool().await else {
        eprintln!("Skipping test: database not available");
        return;
    };

    let secret = "s3cr3t";
    let (repo_id, full_name) = connect_repo(&pool, secret).await;
    let store = ReleaseStore::new(pool.clone());

    let orchestrator = build_orchestrator(&pool, Arc::new(acme_host()), Arc::new(FakeBackend::new()));
    let (payload, signature) = signed_webhook(&full_name, "v1.2.0", secret);
    let release_id = match orchestrator
        .handle_webhook(Some("release"), Some(&signature), &payload)
        .await
        .expect("process")
    {
        WebhookOutcome::Processed { release_id, .. } => release_id,
        other => panic!("expected Processed, got {other:?}"),
    };

    // A human overrides the customer document.
    let edited = store
        .edit_notes(
            release_id,
            &EditNotesRequest {
                customer_md: Some("Hand-written customer notes".to_string()),
                developer_md: None,
                stakeholder_md: None,
            },
        )
        .await
        .expect("edit");
    assert!(edited.customer_edited);
    assert!(!edited.developer_edited);

    // Non-forced regeneration keeps the edited audience.
    let regenerated = orchestrator
        .regenerate(release_id, false)
        .await
        .expect("regenerate");
    assert_eq!(regenerated.customer_md, "Hand-written customer notes");
    assert!(regenerated.customer_edited);
    assert_ne!(regenerated.developer_md, edited.developer_md);

    // Forced regeneration overwrites everything and clears the flags.
    let forced = orchestrator
        .regenerate(release_id, true)
        .await
        .expect("forced regenerate");
    assert_ne!(forced.customer_md, "Hand-written customer notes");
    assert!(!forced.customer_edited);
    assert!(!forced.developer_edited);
    assert!(!forced.stakeholder_edited);

    cleanup_repo(&pool, repo_id).await;
}

// A re-publish appends outcome rows rather than replacing them.
#[ignore]
#[actix_web::test]
async fn republish_appends_outcome_rows() {
    let Some(pool) = try_create_test_pool().await else {
        eprintln!("Skipping test: database not available");
        return;
    };

    let secret = "s3cr3t";
    let (repo_id, full_name) = connect_repo(&pool, secret).await;
    let store = ReleaseStore::new(pool.clone());

    let orchestrator = build_orchestrator(&pool, Arc::new(acme_host()), Arc::new(FakeBackend::new()));
    let (payload, signature) = signed_webhook(&full_name, "v1.2.0", secret);
    let release_id = match orchestrator
        .handle_webhook(Some("release"), Some(&signature), &payload)
        .await
        .expect("process")
    {
        WebhookOutcome::Processed { release_id, .. } => release_id,
        other => panic!("expected Processed, got {other:?}"),
    };

    let before = store.list_outcomes(release_id).await.expect("outcomes").len();

    let (attempted, delivered) = orchestrator.publish(release_id).await.expect("publish");
    assert_eq!(attempted, 3, "hosted targets only");
    assert_eq!(delivered, 3);

    let after = store.list_outcomes(release_id).await.expect("outcomes").len();
    assert_eq!(after, before + 3, "outcomes are append-only");

    cleanup_repo(&pool, repo_id).await;
}
