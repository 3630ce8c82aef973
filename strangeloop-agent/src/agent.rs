//! Agent implementation - one decision, one action

use crate::plan::ActionPlan;
use crate::prompt::{decision_prompt, run_command};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use strangeloop_runtime::registry::{SYNTHESIS_MAX_TOKENS, SYNTHESIS_TEMPERATURE};
use strangeloop_runtime::{
    Capability, CapabilityMeta, CompletionProvider, CompletionRequest, Error, Registry, Result,
};
use tracing::{debug, info, warn};

/// Configuration for the agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Act on the decision instead of describing it
    pub auto_execute: bool,
    pub decision_max_tokens: usize,
    pub decision_temperature: f32,
    pub synthesis_max_tokens: usize,
    pub synthesis_temperature: f32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            auto_execute: true,
            decision_max_tokens: 1024,
            decision_temperature: 0.2,
            synthesis_max_tokens: SYNTHESIS_MAX_TOKENS,
            synthesis_temperature: SYNTHESIS_TEMPERATURE,
        }
    }
}

/// A capability synthesized, injected and (possibly) persisted during a run
#[derive(Debug)]
pub struct Creation {
    pub meta: CapabilityMeta,
    /// What the new capability shadowed, if anything
    pub replaced: Option<CapabilityMeta>,
    /// Where it was written, or why it could not be
    pub persisted: Result<PathBuf>,
}

/// What a run did
#[derive(Debug)]
pub enum Outcome {
    /// A capability was called; `created` is set when it was synthesized first
    Invoked {
        name: String,
        result: Value,
        created: Option<Creation>,
    },
    /// A new capability is available but was not called
    Created(Creation),
    /// A capability was synthesized for the request but calling it failed
    InvokeFailed { creation: Creation, error: Error },
    /// The command that would carry out the decision
    Suggested { command: String, rationale: String },
    /// Nothing was done; the text says how to proceed
    Guidance(String),
    /// The model answered the request itself
    Responded(String),
}

/// The dispatcher
pub struct Agent<P: CompletionProvider> {
    provider: P,
    config: AgentConfig,
}

impl<P: CompletionProvider> Agent<P> {
    /// Create a new agent with default configuration
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, AgentConfig::default())
    }

    pub fn with_config(provider: P, config: AgentConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Handle one request end to end
    pub async fn run(&self, registry: &mut Registry, request: &str) -> Result<Outcome> {
        if request.trim().is_empty() {
            return Err(Error::invalid_argument("request is empty").with_operation("agent::run"));
        }

        let capabilities = registry.list();
        if capabilities.is_empty() {
            return self.run_without_capabilities(registry, request).await;
        }

        let prompt = decision_prompt(request, &capabilities);
        debug!(
            capabilities = capabilities.len(),
            prompt_chars = prompt.len(),
            "asking for a decision"
        );
        let reply = self
            .provider
            .complete(
                CompletionRequest::new(prompt)
                    .with_max_tokens(self.config.decision_max_tokens)
                    .with_temperature(self.config.decision_temperature),
            )
            .await?;

        let plan = ActionPlan::parse(&reply)?;
        info!(plan = ?plan, "decision received");
        self.dispatch(registry, plan).await
    }

    async fn run_without_capabilities(
        &self,
        registry: &mut Registry,
        request: &str,
    ) -> Result<Outcome> {
        if !self.config.auto_execute {
            return Ok(Outcome::Guidance(
                "No capabilities are available yet. Create one with \
                 `strangeloop capability add <description>`, or rerun with --auto-execute \
                 to create one from this request."
                    .to_string(),
            ));
        }

        info!("no capabilities available, synthesizing one from the request");
        let creation = self.create(registry, request).await?;
        let name = creation.meta.name.clone();
        match registry.invoke(&name, Vec::new(), Map::new(), false).await {
            Ok(result) => Ok(Outcome::Invoked {
                name,
                result,
                created: Some(creation),
            }),
            Err(error) => {
                warn!(capability = %name, "created but could not be called: {}", error);
                Ok(Outcome::InvokeFailed { creation, error })
            }
        }
    }

    async fn dispatch(&self, registry: &mut Registry, plan: ActionPlan) -> Result<Outcome> {
        match plan {
            ActionPlan::UseCapability {
                name,
                arguments,
                rationale,
            } => {
                registry
                    .describe(&name)
                    .map_err(|e| e.with_operation("agent::dispatch"))?;
                if !self.config.auto_execute {
                    return Ok(Outcome::Suggested {
                        command: run_command(&name, &arguments),
                        rationale,
                    });
                }
                let result = registry.invoke(&name, arguments, Map::new(), false).await?;
                Ok(Outcome::Invoked {
                    name,
                    result,
                    created: None,
                })
            }
            ActionPlan::CreateCapability { description, .. } => {
                if !self.config.auto_execute {
                    return Ok(Outcome::Guidance(format!(
                        "A new capability is needed. Create it with:\n  strangeloop capability add {}",
                        description
                    )));
                }
                self.create(registry, &description).await.map(Outcome::Created)
            }
            ActionPlan::DirectResponse { text, .. } => Ok(Outcome::Responded(text)),
        }
    }

    /// Synthesize, inject and persist; a persistence failure is recorded, not raised
    async fn create(&self, registry: &mut Registry, description: &str) -> Result<Creation> {
        let capability = Arc::new(
            registry
                .synthesize(
                    &self.provider,
                    description,
                    self.config.synthesis_max_tokens,
                    self.config.synthesis_temperature,
                )
                .await?,
        );
        let meta = capability.meta().clone();
        let replaced = registry.inject(capability);
        let persisted = registry.persist(&meta);
        if let Err(e) = &persisted {
            warn!(capability = %meta.name, "injected but not persisted: {}", e);
        }
        Ok(Creation {
            meta,
            replaced,
            persisted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use strangeloop_runtime::{ErrorKind, Origin, ScriptHost};

    const DOUBLE: &str = "/// Doubles a number.\n///\n/// # Parameters\n/// - n: int - the number to double\nfn double_number(n) { n * 2 }";

    /// Replies from a queue and records every prompt
    struct Scripted {
        replies: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl CompletionProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-1"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            self.prompts.lock().unwrap().push(request.prompt);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::transport("no scripted reply left"))
        }
    }

    fn registry_with_double() -> (tempfile::TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new(dir.path().join("capabilities"));
        let capability = ScriptHost::new().compile(DOUBLE, Origin::Synthesized).unwrap();
        registry.inject(Arc::new(capability));
        (dir, registry)
    }

    fn agent(replies: &[&str], auto_execute: bool) -> Agent<Scripted> {
        Agent::with_config(
            Scripted::new(replies),
            AgentConfig {
                auto_execute,
                ..AgentConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_use_capability_invokes_with_plan_arguments() {
        let (_dir, mut registry) = registry_with_double();
        let agent = agent(
            &[r#"{"action":"use_capability","capability":"double_number","arguments":["21"],"explanation":"doubling"}"#],
            true,
        );

        let outcome = agent.run(&mut registry, "double 21").await.unwrap();
        match outcome {
            Outcome::Invoked { name, result, created } => {
                assert_eq!(name, "double_number");
                assert_eq!(result, json!(42));
                assert!(created.is_none());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let prompts = agent.provider.prompts.lock().unwrap();
        assert!(prompts[0].contains("double 21"));
        assert!(prompts[0].contains("double_number(n: int)"));
    }

    #[tokio::test]
    async fn test_use_capability_without_auto_execute_suggests_command() {
        let (_dir, mut registry) = registry_with_double();
        let agent = agent(
            &[r#"{"action":"use_capability","capability":"double_number","arguments":[21],"explanation":"doubling"}"#],
            false,
        );

        match agent.run(&mut registry, "double 21").await.unwrap() {
            Outcome::Suggested { command, rationale } => {
                assert_eq!(command, "strangeloop capability run double_number 21");
                assert_eq!(rationale, "doubling");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_reply_leaves_registry_unchanged() {
        let (_dir, mut registry) = registry_with_double();
        let before = registry.list();
        let agent = agent(&["Let me think about that..."], true);

        let err = agent.run(&mut registry, "double 21").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PlanParse);
        assert_eq!(err.context_value("reply"), Some("Let me think about that..."));
        assert_eq!(registry.list(), before);
        assert!(!registry.manifest_path().exists());
    }

    #[tokio::test]
    async fn test_unknown_capability_is_not_found_without_synthesis() {
        let (_dir, mut registry) = registry_with_double();
        let agent = agent(
            &[
                r#"{"action":"use_capability","capability":"missing_fn","arguments":[]}"#,
                DOUBLE,
            ],
            true,
        );

        let err = agent.run(&mut registry, "do the thing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(agent.provider.calls(), 1);
        assert_eq!(registry.list().len(), 1);
    }

    #[tokio::test]
    async fn test_create_capability_injects_and_persists() {
        let (_dir, mut registry) = registry_with_double();
        let triple = "/// Triples a number.\n///\n/// # Parameters\n/// - n: int\nfn triple_number(n) { n * 3 }";
        let agent = agent(
            &[
                r#"{"action":"create_capability","description":"triple a number","explanation":"missing"}"#,
                triple,
            ],
            true,
        );

        let creation = match agent.run(&mut registry, "triple 5").await.unwrap() {
            Outcome::Created(creation) => creation,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(creation.meta.name, "triple_number");
        assert!(creation.replaced.is_none());
        let path = creation.persisted.unwrap();
        assert!(path.exists());

        assert!(agent.provider.prompts.lock().unwrap()[1].contains("triple a number"));
        let result = registry
            .invoke("triple_number", vec![json!(5)], Map::new(), false)
            .await
            .unwrap();
        assert_eq!(result, json!(15));
    }

    #[tokio::test]
    async fn test_create_capability_without_auto_execute_gives_guidance() {
        let (_dir, mut registry) = registry_with_double();
        let agent = agent(
            &[r#"{"action":"create_capability","description":"reverse a string"}"#],
            false,
        );

        match agent.run(&mut registry, "reverse abc").await.unwrap() {
            Outcome::Guidance(text) => {
                assert!(text.contains("strangeloop capability add reverse a string"))
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(agent.provider.calls(), 1);
        assert_eq!(registry.list().len(), 1);
    }

    #[tokio::test]
    async fn test_direct_response() {
        let (_dir, mut registry) = registry_with_double();
        let agent = agent(
            &[r#"{"action":"direct_response","response":"Paris","explanation":"trivia"}"#],
            true,
        );

        match agent.run(&mut registry, "capital of France?").await.unwrap() {
            Outcome::Responded(text) => assert_eq!(text, "Paris"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_registry_auto_execute_synthesizes_and_invokes() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new(dir.path().join("capabilities"));
        let agent = agent(&["```rhai\n/// The answer.\nfn the_answer() { 42 }\n```"], true);

        match agent.run(&mut registry, "what is the answer").await.unwrap() {
            Outcome::Invoked { name, result, created } => {
                assert_eq!(name, "the_answer");
                assert_eq!(result, json!(42));
                assert!(created.unwrap().persisted.is_ok());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(agent.provider.calls(), 1);
        assert!(agent.provider.prompts.lock().unwrap()[0].contains("what is the answer"));
        assert_eq!(registry.describe("the_answer").unwrap().name, "the_answer");
    }

    #[tokio::test]
    async fn test_empty_registry_keeps_creation_when_call_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new(dir.path().join("capabilities"));
        let agent = agent(&[DOUBLE], true);

        match agent.run(&mut registry, "double the number 21").await.unwrap() {
            Outcome::InvokeFailed { creation, error } => {
                assert_eq!(creation.meta.name, "double_number");
                assert!(creation.persisted.unwrap().exists());
                assert_eq!(error.kind(), ErrorKind::InvalidArgument);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(registry.describe("double_number").unwrap().name, "double_number");
    }

    #[tokio::test]
    async fn test_empty_registry_without_auto_execute_gives_guidance() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new(dir.path().join("capabilities"));
        let agent = agent(&[], false);

        let outcome = agent.run(&mut registry, "anything").await.unwrap();
        assert!(matches!(outcome, Outcome::Guidance(_)));
        assert_eq!(agent.provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_persist_failure_is_recorded_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "file").unwrap();
        let mut registry = Registry::new(&blocker);
        let capability = ScriptHost::new().compile(DOUBLE, Origin::Synthesized).unwrap();
        registry.inject(Arc::new(capability));

        let agent = agent(
            &[
                r#"{"action":"create_capability","description":"negate a number"}"#,
                "/// Negates.\nfn negate(n) { -n }",
            ],
            true,
        );

        let creation = match agent.run(&mut registry, "negate 4").await.unwrap() {
            Outcome::Created(creation) => creation,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(creation.persisted.unwrap_err().kind(), ErrorKind::Io);
        assert_eq!(registry.describe("negate").unwrap().name, "negate");
    }

    #[tokio::test]
    async fn test_empty_request_rejected() {
        let (_dir, mut registry) = registry_with_double();
        let err = agent(&[], true).run(&mut registry, "   ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert!(config.auto_execute);
        assert_eq!(config.decision_max_tokens, 1024);
        assert_eq!(config.synthesis_max_tokens, 2048);
        assert_eq!(config.synthesis_temperature, 0.2);
    }
}
