//! Note Generator
//!
//! Turns a normalized change-set into three audience-specific markdown
//! documents (customer, developer, stakeholder). The three generations run
//! concurrently and fail together: a failure in any one audience fails the
//! whole operation and no partial document set is returned.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::models::{Audience, ChangeSet, GeneratedNotes, ReleaseSummary, StyleConfig};
use crate::services::llm::{ChatMessage, CompletionBackend, CompletionError};

/// Errors from document generation
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation failed for {audience} audience: {source}")]
    Completion {
        audience: Audience,
        #[source]
        source: CompletionError,
    },
}

/// Generates the per-audience document set for a release
pub struct NoteGenerator {
    backend: Arc<dyn CompletionBackend>,
}

impl NoteGenerator {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Generate all three audience documents.
    ///
    /// The calls are issued in parallel and awaited jointly; token usage is
    /// summed across the three and the model identifier is shared. A
    /// zero-commit change-set still produces three non-empty documents.
    pub async fn generate(
        &self,
        summary: &ReleaseSummary,
        description: Option<&str>,
        change_set: &ChangeSet,
        style: &StyleConfig,
    ) -> Result<GeneratedNotes, GenerationError> {
        let context = build_context(summary, description, change_set);

        let (customer, developer, stakeholder) = tokio::try_join!(
            self.generate_for(Audience::Customer, &context, style),
            self.generate_for(Audience::Developer, &context, style),
            self.generate_for(Audience::Stakeholder, &context, style),
        )?;

        let tokens_used = customer.tokens_used + developer.tokens_used + stakeholder.tokens_used;
        // All three calls share one configured model; record the identifier
        // the provider reported.
        let model = customer.model.clone();

        info!(
            repo = %summary.repo_full_name,
            tag = %summary.tag_name,
            tokens_used,
            %model,
            "generated release documents"
        );

        Ok(GeneratedNotes {
            customer_md: customer.text,
            developer_md: developer.text,
            stakeholder_md: stakeholder.text,
            tokens_used,
            model,
        })
    }

    async fn generate_for(
        &self,
        audience: Audience,
        context: &str,
        style: &StyleConfig,
    ) -> Result<crate::services::llm::Completion, GenerationError> {
        let messages = [
            ChatMessage::system(system_prompt(audience, style)),
            ChatMessage::user(context.to_string()),
        ];
        self.backend
            .complete(&messages)
            .await
            .map_err(|source| GenerationError::Completion { audience, source })
    }
}

/// Fixed role and style rules for one audience
fn system_prompt(audience: Audience, style: &StyleConfig) -> String {
    let mut prompt = String::from(match audience {
        Audience::Customer => {
            "You write customer-facing release notes. Describe what changed in \
             plain language, lead with user-visible improvements and fixes, and \
             avoid technical jargon, file names, and internal identifiers. \
             Output markdown."
        }
        Audience::Developer => {
            "You write developer changelogs. Produce a precise technical summary \
             grouped into Added, Changed, and Fixed sections, reference pull \
             request numbers where known, and keep entries terse. Output \
             markdown."
        }
        Audience::Stakeholder => {
            "You write release summaries for business stakeholders. Summarize \
             the impact and progress this release represents in a short \
             paragraph plus highlights, without implementation detail. Output \
             markdown."
        }
    });

    prompt.push_str(
        "\nIf the change list is empty, state that this release contains no \
         significant changes rather than inventing content.",
    );
    if let Some(tone) = &style.tone {
        prompt.push_str(&format!("\nTone: {tone}."));
    }
    if let Some(language) = &style.language {
        prompt.push_str(&format!("\nWrite in {language}."));
    }
    if let Some(extra) = &style.extra_instructions {
        prompt.push_str(&format!("\nAdditional instructions: {extra}"));
    }
    prompt
}

/// The change-set serialized as structured context for the model
fn build_context(
    summary: &ReleaseSummary,
    description: Option<&str>,
    change_set: &ChangeSet,
) -> String {
    let mut context = format!(
        "Repository: {}\nNew version: {}\n",
        summary.repo_full_name, summary.tag_name
    );
    if let Some(previous) = &change_set.previous_tag {
        context.push_str(&format!("Previous version: {previous}\n"));
    }
    if let Some(description) = description.filter(|d| !d.trim().is_empty()) {
        context.push_str(&format!("\nRelease description:\n{description}\n"));
    }

    if change_set.is_empty() {
        context.push_str("\nNo code changes were found between versions.\n");
        return context;
    }

    if !change_set.pull_requests.is_empty() {
        context.push_str("\nMerged pull requests:\n");
        for pull in &change_set.pull_requests {
            context.push_str(&format!("- #{} {}", pull.number, pull.title));
            if !pull.labels.is_empty() {
                context.push_str(&format!(" [{}]", pull.labels.join(", ")));
            }
            if let Some(author) = &pull.author_login {
                context.push_str(&format!(" (by {author})"));
            }
            context.push('\n');
            if let Some(body) = pull.body.as_ref().filter(|b| !b.trim().is_empty()) {
                for line in body.lines().take(6) {
                    context.push_str(&format!("  {line}\n"));
                }
            }
        }
    }

    if !change_set.commits.is_empty() {
        context.push_str("\nCommits (oldest first):\n");
        for commit in &change_set.commits {
            let subject = commit.message.lines().next().unwrap_or("");
            context.push_str(&format!("- {} ({})\n", subject, commit.author_name));
        }
    }

    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommitInfo, PullRequestInfo};
    use crate::services::llm::Completion;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Backend that records prompts and answers with canned text.
    struct FakeBackend {
        prompts: Mutex<Vec<Vec<ChatMessage>>>,
        fail: bool,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for FakeBackend {
        async fn complete(
            &self,
            messages: &[ChatMessage],
        ) -> Result<Completion, CompletionError> {
            self.prompts
                .lock()
                .expect("prompt lock")
                .push(messages.to_vec());
            if self.fail {
                return Err(CompletionError::EmptyCompletion);
            }
            Ok(Completion {
                text: "## Notes\nSomething shipped.".to_string(),
                tokens_used: 100,
                model: "test-model-1".to_string(),
            })
        }
    }

    fn summary() -> ReleaseSummary {
        ReleaseSummary {
            repo_full_name: "acme/widgets".to_string(),
            tag_name: "v1.2.0".to_string(),
            release_url: None,
        }
    }

    fn populated_change_set() -> ChangeSet {
        ChangeSet {
            previous_tag: Some("v1.1.0".to_string()),
            commits: vec![CommitInfo {
                sha: "a1".to_string(),
                message: "Fix login flow (#42)".to_string(),
                author_name: "octocat".to_string(),
            }],
            pull_requests: vec![PullRequestInfo {
                number: 42,
                title: "Fix login flow".to_string(),
                body: None,
                labels: vec!["bug".to_string()],
                author_login: Some("octocat".to_string()),
            }],
        }
    }

    #[tokio::test]
    async fn generates_three_documents_and_sums_tokens() {
        let backend = Arc::new(FakeBackend::new());
        let generator = NoteGenerator::new(backend.clone());

        let notes = generator
            .generate(&summary(), Some("Big release"), &populated_change_set(), &StyleConfig::default())
            .await
            .expect("generate");

        assert!(!notes.customer_md.is_empty());
        assert!(!notes.developer_md.is_empty());
        assert!(!notes.stakeholder_md.is_empty());
        assert_eq!(notes.tokens_used, 300);
        assert_eq!(notes.model, "test-model-1");
        assert_eq!(backend.prompts.lock().expect("prompt lock").len(), 3);
    }

    #[tokio::test]
    async fn empty_change_set_still_generates() {
        let backend = Arc::new(FakeBackend::new());
        let generator = NoteGenerator::new(backend.clone());

        let notes = generator
            .generate(&summary(), None, &ChangeSet::default(), &StyleConfig::default())
            .await
            .expect("generate");

        assert!(!notes.customer_md.is_empty());
        assert!(!notes.developer_md.is_empty());
        assert!(!notes.stakeholder_md.is_empty());

        let prompts = backend.prompts.lock().expect("prompt lock");
        for messages in prompts.iter() {
            assert!(messages[1].content.contains("No code changes"));
        }
    }

    #[tokio::test]
    async fn one_failure_fails_the_whole_operation() {
        let generator = NoteGenerator::new(Arc::new(FakeBackend::failing()));

        let result = generator
            .generate(&summary(), None, &populated_change_set(), &StyleConfig::default())
            .await;

        assert!(matches!(result, Err(GenerationError::Completion { .. })));
    }

    #[tokio::test]
    async fn context_carries_change_set_facts() {
        let backend = Arc::new(FakeBackend::new());
        let generator = NoteGenerator::new(backend.clone());

        generator
            .generate(&summary(), Some("Big release"), &populated_change_set(), &StyleConfig::default())
            .await
            .expect("generate");

        let prompts = backend.prompts.lock().expect("prompt lock");
        let user = &prompts[0][1].content;
        assert!(user.contains("acme/widgets"));
        assert!(user.contains("v1.2.0"));
        assert!(user.contains("v1.1.0"));
        assert!(user.contains("#42 Fix login flow"));
        assert!(user.contains("Big release"));
    }

    #[test]
    fn style_config_shapes_the_system_prompt() {
        let style = StyleConfig {
            tone: Some("playful".to_string()),
            language: Some("German".to_string()),
            extra_instructions: Some("Mention the docs site.".to_string()),
        };
        let prompt = system_prompt(Audience::Customer, &style);

        assert!(prompt.contains("Tone: playful."));
        assert!(prompt.contains("Write in German."));
        assert!(prompt.contains("Mention the docs site."));
    }

    #[test]
    fn audience_prompts_differ() {
        let style = StyleConfig::default();
        let customer = system_prompt(Audience::Customer, &style);
        let developer = system_prompt(Audience::Developer, &style);
        let stakeholder = system_prompt(Audience::Stakeholder, &style);

        assert_ne!(customer, developer);
        assert_ne!(developer, stakeholder);
        assert_ne!(customer, stakeholder);
    }
}
