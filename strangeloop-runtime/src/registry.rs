//! # Capability Registry
//!
//! The set of capabilities reachable in this process. Three layers resolve a
//! name, later layers shadowing earlier ones:
//!
//! 1. bundled native capabilities ([`Registry::with_builtins`])
//! 2. persisted capabilities listed in `<dir>/manifest`, re-read on every lookup
//! 3. capabilities injected during this process
//!
//! Synthesis, injection and persistence are separate steps so a caller can
//! report "injected but not persisted" without rolling anything back.

use crate::builtin;
use crate::capability::{is_valid_name, parse_lenient, Capability, CapabilityMeta, Origin};
use crate::error::{self, Error, Result};
use crate::fence::strip_code_fences;
use crate::provider::{CompletionProvider, CompletionRequest};
use crate::script::{ScriptCapability, ScriptHost};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registration list file inside the capabilities directory
pub const MANIFEST_FILE: &str = "manifest";

/// File extension of persisted capability sources
pub const SOURCE_EXT: &str = "rhai";

/// Default token budget for synthesis
pub const SYNTHESIS_MAX_TOKENS: usize = 2048;

/// Default temperature for synthesis
pub const SYNTHESIS_TEMPERATURE: f32 = 0.2;

const SYNTHESIS_PROMPT: &str = r#"Write exactly one function in the Rhai scripting language that implements the following capability:

{description}

Requirements:
- Define exactly one function with `fn name(params) { ... }`. Use a descriptive snake_case name.
- Put a `///` doc comment block directly above the function. The first line is a one-sentence summary.
- Document every parameter under a `/// # Parameters` heading, one per line, as
  `/// - name: type - description` or `/// - name: type = default - description`.
  Valid types are int, float, bool, string, array, map and any.
- Signal invalid input or failure with `throw "message";`.
- The script has no access to files, network or processes. Use only the Rhai standard library.
- Return the result value from the function. Do not call the function or add top-level statements.

Example:

/// Doubles a number.
///
/// # Parameters
/// - n: int - the number to double
fn double_number(n) {
    n * 2
}

Return only the code, with no explanation."#;

/// Render the synthesis prompt for a natural-language description
pub fn synthesis_prompt(description: &str) -> String {
    SYNTHESIS_PROMPT.replace("{description}", description.trim())
}

/// Live mapping from capability name to capability
pub struct Registry {
    dir: PathBuf,
    host: ScriptHost,
    builtins: BTreeMap<String, Arc<dyn Capability>>,
    injected: BTreeMap<String, Arc<dyn Capability>>,
}

impl Registry {
    /// Registry persisting to `dir`. The directory is created on first persist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            host: ScriptHost::new(),
            builtins: BTreeMap::new(),
            injected: BTreeMap::new(),
        }
    }

    /// Add the capabilities bundled with the binary
    pub fn with_builtins(mut self) -> Self {
        for capability in builtin::all() {
            self.builtins.insert(capability.name().to_string(), capability);
        }
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// Where `persist` writes the source of `name`
    pub fn source_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, SOURCE_EXT))
    }

    /// Registered file names in manifest order
    fn manifest_entries(&self) -> Vec<String> {
        match std::fs::read_to_string(self.manifest_path()) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Compile every capability registered in the manifest.
    ///
    /// Entries whose file is missing or no longer compiles are skipped with a
    /// warning; a later entry for the same name wins.
    fn load_persisted(&self) -> BTreeMap<String, Arc<dyn Capability>> {
        let mut loaded: BTreeMap<String, Arc<dyn Capability>> = BTreeMap::new();
        for entry in self.manifest_entries() {
            let path = self.dir.join(&entry);
            let source = match std::fs::read_to_string(&path) {
                Ok(source) => source,
                Err(e) => {
                    warn!("skipping persisted capability {}: {}", path.display(), e);
                    continue;
                }
            };
            match self.host.compile(&source, Origin::Synthesized) {
                Ok(capability) => {
                    loaded.insert(capability.name().to_string(), Arc::new(capability));
                }
                Err(e) => warn!("skipping persisted capability {}: {}", path.display(), e),
            }
        }
        loaded
    }

    fn resolved(&self) -> BTreeMap<String, Arc<dyn Capability>> {
        let mut all = self.builtins.clone();
        all.extend(self.load_persisted());
        all.extend(self.injected.iter().map(|(k, v)| (k.clone(), v.clone())));
        all
    }

    /// Metadata of every reachable capability, sorted by name
    pub fn list(&self) -> Vec<CapabilityMeta> {
        self.resolved()
            .values()
            .map(|capability| capability.meta().clone())
            .collect()
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Capability>> {
        if let Some(capability) = self.injected.get(name) {
            return Ok(capability.clone());
        }
        if let Some(capability) = self.load_persisted().remove(name) {
            return Ok(capability);
        }
        self.builtins
            .get(name)
            .cloned()
            .ok_or_else(|| Error::capability_not_found(name).with_operation("registry::get"))
    }

    pub fn describe(&self, name: &str) -> Result<CapabilityMeta> {
        self.get(name)
            .map(|capability| capability.meta().clone())
            .map_err(|e| e.with_operation("registry::describe"))
    }

    /// Bind arguments against the signature and call the capability.
    ///
    /// With `parse_json`, string arguments are parsed as JSON where possible.
    pub async fn invoke(
        &self,
        name: &str,
        positional: Vec<Value>,
        keyword: Map<String, Value>,
        parse_json: bool,
    ) -> Result<Value> {
        let capability = self.get(name)?;
        let (positional, keyword) = if parse_json {
            (
                positional.into_iter().map(parse_json_arg).collect(),
                keyword
                    .into_iter()
                    .map(|(key, value)| (key, parse_json_arg(value)))
                    .collect(),
            )
        } else {
            (positional, keyword)
        };

        let args = capability
            .meta()
            .signature
            .bind(positional, keyword)
            .map_err(|e| e.with_context("capability", name))?;
        debug!(capability = name, args = ?args, "invoking capability");

        capability
            .call(args)
            .await
            .map_err(|e| e.with_operation("registry::invoke"))
    }

    /// Ask the provider for a new capability and compile it.
    ///
    /// Nothing is registered; follow with [`inject`](Self::inject) and
    /// [`persist`](Self::persist).
    pub async fn synthesize<P: CompletionProvider>(
        &self,
        provider: &P,
        description: &str,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<ScriptCapability> {
        if description.trim().is_empty() {
            return Err(Error::invalid_argument("capability description is empty")
                .with_operation("registry::synthesize"));
        }

        let request = CompletionRequest::new(synthesis_prompt(description))
            .with_max_tokens(max_tokens)
            .with_temperature(temperature);
        let reply = provider.complete(request).await?;
        let code = strip_code_fences(&reply);
        debug!(code_chars = code.len(), "received generated code");

        let capability = self
            .host
            .compile(code, Origin::Synthesized)
            .map_err(|e| e.with_operation("registry::synthesize"))?;
        info!(capability = %capability.name(), "synthesized capability");
        Ok(capability)
    }

    /// Bind `capability` into this process, returning what it replaced
    pub fn inject(&mut self, capability: Arc<dyn Capability>) -> Option<CapabilityMeta> {
        let name = capability.name().to_string();
        let replaced = self.describe(&name).ok();
        if let Some(previous) = &replaced {
            warn!(
                capability = %name,
                previous = %previous.display_signature(),
                "replacing existing capability"
            );
        }
        self.injected.insert(name.clone(), capability);
        info!(capability = %name, "injected capability");
        replaced
    }

    /// Write the capability's source to disk and register it in the manifest
    pub fn persist(&self, meta: &CapabilityMeta) -> Result<PathBuf> {
        if !is_valid_name(&meta.name) {
            return Err(Error::invalid_argument(format!(
                "'{}' is not a valid capability name",
                meta.name
            ))
            .with_operation("registry::persist"));
        }
        let source = meta.source.as_deref().ok_or_else(|| {
            Error::invalid_argument(format!("capability '{}' has no source to persist", meta.name))
                .with_operation("registry::persist")
        })?;

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| error::io_error("create capabilities dir", &self.dir, e))?;

        let path = self.source_path(&meta.name);
        let content = if source.trim_start().starts_with("//!") {
            source.to_string()
        } else {
            format!("//! Generated capability: {}\n\n{}", meta.name, source)
        };
        let content = if content.ends_with('\n') {
            content
        } else {
            content + "\n"
        };
        std::fs::write(&path, content).map_err(|e| error::io_error("write", &path, e))?;

        self.register(&meta.name)?;
        info!(capability = %meta.name, path = %path.display(), "persisted capability");
        Ok(path)
    }

    /// Append `<name>.rhai` to the manifest unless already present
    fn register(&self, name: &str) -> Result<()> {
        let entry = format!("{}.{}", name, SOURCE_EXT);
        if self.manifest_entries().contains(&entry) {
            debug!(capability = name, "already registered in manifest");
            return Ok(());
        }

        let manifest = self.manifest_path();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&manifest)
            .map_err(|e| error::io_error("open", &manifest, e))?;
        writeln!(file, "{}", entry).map_err(|e| error::io_error("append to", &manifest, e))
    }
}

fn parse_json_arg(value: Value) -> Value {
    match value {
        Value::String(raw) => parse_lenient(&raw),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use strangeloop_error::ErrorKind;

    const DOUBLE: &str = "/// Doubles a number.\n///\n/// # Parameters\n/// - n: int - the number\nfn double_number(n) {\n    n * 2\n}";

    /// Replies with canned text and records prompts
    struct Canned {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl Canned {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl CompletionProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        fn model(&self) -> &str {
            "canned-1"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            self.prompts.lock().unwrap().push(request.prompt);
            Ok(self.reply.clone())
        }
    }

    fn registry() -> (tempfile::TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(dir.path().join("capabilities"));
        (dir, registry)
    }

    fn synthesize(registry: &Registry, reply: &str) -> Result<ScriptCapability> {
        let provider = Canned::new(reply);
        tokio_test::block_on(registry.synthesize(&provider, "double a number", 2048, 0.2))
    }

    #[test]
    fn test_empty_registry() {
        let (_dir, registry) = registry();
        assert!(registry.list().is_empty());
        let err = registry.describe("missing_fn").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.context_value("capability"), Some("missing_fn"));
    }

    #[test]
    fn test_synthesize_sends_description_and_strips_fences() {
        let (_dir, registry) = registry();
        let provider = Canned::new(&format!("```rhai\n{}\n```", DOUBLE));
        let capability = tokio_test::block_on(registry.synthesize(
            &provider,
            "double a number",
            2048,
            0.2,
        ))
        .unwrap();

        assert_eq!(capability.name(), "double_number");
        let prompts = provider.prompts.lock().unwrap();
        assert!(prompts[0].contains("double a number"));
        assert!(prompts[0].contains("# Parameters"));
        // Synthesis alone registers nothing
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_synthesize_rejects_non_code() {
        let (_dir, registry) = registry();
        let err = synthesize(&registry, "Sorry, I can't help with that.").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Synthesis);

        let provider = Canned::new(DOUBLE);
        let err = tokio_test::block_on(registry.synthesize(&provider, "  ", 2048, 0.2))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_inject_then_describe_and_invoke() {
        let (_dir, mut registry) = registry();
        let capability = synthesize(&registry, DOUBLE).unwrap();
        assert!(registry.inject(Arc::new(capability)).is_none());

        let meta = registry.describe("double_number").unwrap();
        assert_eq!(meta.name, "double_number");
        assert_eq!(meta.origin, Origin::Synthesized);

        let result = tokio_test::block_on(registry.invoke(
            "double_number",
            vec![json!(21)],
            Map::new(),
            false,
        ))
        .unwrap();
        assert_eq!(result, json!(42));
    }

    #[test]
    fn test_invoke_parse_json_and_keywords() {
        let (_dir, mut registry) = registry();
        let source = "/// Sums and scales.\n///\n/// # Parameters\n/// - items: array\n/// - scale: int = 1\nfn scaled_total(items, scale) {\n    let total = 0;\n    for x in items { total += x; }\n    total * scale\n}";
        let capability = synthesize(&registry, source).unwrap();
        registry.inject(Arc::new(capability));

        let mut keyword = Map::new();
        keyword.insert("scale".into(), json!("10"));
        let result = tokio_test::block_on(registry.invoke(
            "scaled_total",
            vec![json!("[1, 2, 3]")],
            keyword,
            true,
        ))
        .unwrap();
        assert_eq!(result, json!(60));
    }

    #[test]
    fn test_invoke_binding_errors() {
        let (_dir, mut registry) = registry();
        registry.inject(Arc::new(synthesize(&registry, DOUBLE).unwrap()));

        let err = tokio_test::block_on(registry.invoke("double_number", vec![], Map::new(), false))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = tokio_test::block_on(registry.invoke("missing_fn", vec![], Map::new(), false))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_persist_visible_to_fresh_registry() {
        let (_dir, mut registry) = registry();
        let capability = Arc::new(synthesize(&registry, DOUBLE).unwrap());
        let meta = capability.meta().clone();
        registry.inject(capability);

        let path = registry.persist(&meta).unwrap();
        assert_eq!(path, registry.source_path("double_number"));
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("//! Generated capability: double_number"));
        assert!(written.contains("fn double_number(n)"));

        let fresh = Registry::new(registry.dir());
        let names: Vec<String> = fresh.list().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["double_number"]);
        let result = tokio_test::block_on(fresh.invoke(
            "double_number",
            vec![json!("5")],
            Map::new(),
            true,
        ))
        .unwrap();
        assert_eq!(result, json!(10));
    }

    #[test]
    fn test_persist_twice_registers_once() {
        let (_dir, registry) = registry();
        let meta = synthesize(&registry, DOUBLE).unwrap().meta().clone();

        registry.persist(&meta).unwrap();
        registry.persist(&meta).unwrap();

        let manifest = std::fs::read_to_string(registry.manifest_path()).unwrap();
        assert_eq!(manifest.lines().filter(|l| *l == "double_number.rhai").count(), 1);
    }

    #[test]
    fn test_persist_keeps_existing_header() {
        let (_dir, registry) = registry();
        let source = format!("//! Custom header\n{}", DOUBLE);
        let meta = synthesize(&registry, &source).unwrap().meta().clone();
        let path = registry.persist(&meta).unwrap();
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.starts_with("//! Custom header"));
        assert!(!written.contains("Generated capability"));
    }

    #[test]
    fn test_persist_builtin_has_no_source() {
        let (_dir, registry) = registry();
        let registry = registry.with_builtins();
        let meta = registry.describe("generate_secure_password").unwrap();
        let err = registry.persist(&meta).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_persist_rejects_path_like_names() {
        let (_dir, registry) = registry();
        let mut meta = synthesize(&registry, DOUBLE).unwrap().meta().clone();
        meta.name = "../escape".to_string();
        let err = registry.persist(&meta).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(!registry.dir().exists());
    }

    #[test]
    fn test_inject_reports_replacement() {
        let (_dir, mut registry) = registry();
        registry.inject(Arc::new(synthesize(&registry, DOUBLE).unwrap()));

        let triple = "/// Triples.\nfn double_number(n) { n * 3 }";
        let replaced = registry
            .inject(Arc::new(synthesize(&registry, triple).unwrap()))
            .unwrap();
        assert_eq!(replaced.summary(), "Doubles a number.");

        let result =
            tokio_test::block_on(registry.invoke("double_number", vec![json!(2)], Map::new(), false))
                .unwrap();
        assert_eq!(result, json!(6));
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_precedence_builtin_persisted_injected() {
        let (_dir, registry) = registry();
        let mut registry = registry.with_builtins();
        assert_eq!(
            registry.describe("generate_secure_password").unwrap().origin,
            Origin::Builtin
        );

        let shadow = "/// Persisted version.\nfn generate_secure_password() { \"persisted\" }";
        let meta = synthesize(&registry, shadow).unwrap().meta().clone();
        registry.persist(&meta).unwrap();
        assert_eq!(
            registry.describe("generate_secure_password").unwrap().summary(),
            "Persisted version."
        );

        let injected = "/// Injected version.\nfn generate_secure_password() { \"injected\" }";
        registry.inject(Arc::new(synthesize(&registry, injected).unwrap()));
        assert_eq!(
            registry.describe("generate_secure_password").unwrap().summary(),
            "Injected version."
        );
        assert_eq!(registry.list().len(), 3);
    }

    #[test]
    fn test_broken_persisted_entry_is_skipped() {
        let (_dir, registry) = registry();
        std::fs::create_dir_all(registry.dir()).unwrap();
        std::fs::write(registry.source_path("broken"), "fn broken( {").unwrap();
        std::fs::write(registry.manifest_path(), "broken.rhai\nmissing.rhai\n").unwrap();

        assert!(registry.list().is_empty());
        assert_eq!(registry.describe("broken").unwrap_err().kind(), ErrorKind::NotFound);
    }
}
