//! # Scripting host
//!
//! Synthesized capabilities are Rhai functions. The engine has no host
//! functions registered, no module resolver and `eval` disabled, and runs
//! under fixed operation, depth and size limits. A capability's signature is
//! read from the function's parameter list and enriched from its `///` doc
//! block:
//!
//! ```text
//! /// Doubles a number.
//! ///
//! /// # Parameters
//! /// - n: int - the number to double
//! /// - factor: int = 2 - optional multiplier
//! fn double_number(n, factor) { n * factor }
//! ```

use crate::capability::{
    parse_lenient, Capability, CapabilityMeta, Origin, Param, ParamType, Signature,
};
use crate::error::{self, Error, Result};
use async_trait::async_trait;
use regex::Regex;
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{CallFnOptions, Dynamic, Engine, Scope, AST};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

const MAX_OPERATIONS: u64 = 5_000_000;
const MAX_CALL_LEVELS: usize = 32;
const MAX_EXPR_DEPTH: usize = 64;
const MAX_STRING_SIZE: usize = 1 << 20;
const MAX_COLLECTION_SIZE: usize = 100_000;

fn fn_decl_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(?:private[ \t]+)?fn[ \t]+([A-Za-z_][A-Za-z0-9_]*)[ \t]*\(")
            .expect("valid regex")
    })
}

/// Sandboxed Rhai engine shared by every script capability
#[derive(Clone)]
pub struct ScriptHost {
    engine: Arc<Engine>,
}

impl Default for ScriptHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptHost {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine
            .set_max_operations(MAX_OPERATIONS)
            .set_max_call_levels(MAX_CALL_LEVELS)
            .set_max_expr_depths(MAX_EXPR_DEPTH, MAX_EXPR_DEPTH)
            .set_max_string_size(MAX_STRING_SIZE)
            .set_max_array_size(MAX_COLLECTION_SIZE)
            .set_max_map_size(MAX_COLLECTION_SIZE)
            .set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");
        engine.on_print(|text| info!(target: "capability", "{}", text));
        engine.on_debug(|text, source, pos| {
            debug!(target: "capability", source = source.unwrap_or(""), %pos, "{}", text)
        });

        Self {
            engine: Arc::new(engine),
        }
    }

    /// Compile `source` and bind its first function as a capability.
    ///
    /// Fails with `Synthesis` when the text does not parse or defines no
    /// function.
    pub fn compile(&self, source: &str, origin: Origin) -> Result<ScriptCapability> {
        let ast = self.engine.compile(source).map_err(|e| {
            Error::synthesis(format!("generated code does not parse: {}", e))
                .with_operation("script::compile")
        })?;

        let name = first_function_name(source)
            .filter(|name| ast.iter_functions().any(|f| f.name == name))
            .or_else(|| ast.iter_functions().next().map(|f| f.name.to_string()))
            .ok_or_else(|| {
                Error::synthesis("no function definition found in generated code")
                    .with_operation("script::compile")
            })?;

        let params: Vec<String> = ast
            .iter_functions()
            .find(|f| f.name == name)
            .map(|f| f.params.iter().map(|p| p.to_string()).collect())
            .unwrap_or_default();

        let doc = DocBlock::parse(&doc_comment_for(source, &name));
        let signature = Signature::new(
            params
                .iter()
                .map(|param| doc.param(param))
                .collect(),
        );

        debug!(capability = %name, params = params.len(), "compiled script capability");
        Ok(ScriptCapability {
            meta: CapabilityMeta {
                name,
                signature,
                documentation: doc.text,
                source: Some(source.to_string()),
                origin,
            },
            engine: self.engine.clone(),
            ast,
        })
    }
}

/// A capability backed by a compiled Rhai function
pub struct ScriptCapability {
    meta: CapabilityMeta,
    engine: Arc<Engine>,
    ast: AST,
}

impl ScriptCapability {
    fn call_sync(&self, args: Vec<Value>) -> Result<Value> {
        let name = &self.meta.name;
        let args = self
            .meta
            .signature
            .coerce(args)
            .iter()
            .map(rhai::serde::to_dynamic)
            .collect::<std::result::Result<Vec<Dynamic>, _>>()
            .map_err(|e| {
                Error::invalid_argument(format!("argument not representable in script: {}", e))
                    .with_context("capability", name.clone())
            })?;

        let options = CallFnOptions::new().eval_ast(false);
        let result: Dynamic = self
            .engine
            .call_fn_with_options(options, &mut Scope::new(), &self.ast, name, args)
            .map_err(|e| error::script_failure(name, &e))?;

        rhai::serde::from_dynamic::<Value>(&result).map_err(|e| {
            Error::runtime_failure(name.clone(), format!("result not representable: {}", e))
        })
    }
}

#[async_trait]
impl Capability for ScriptCapability {
    fn meta(&self) -> &CapabilityMeta {
        &self.meta
    }

    async fn call(&self, args: Vec<Value>) -> Result<Value> {
        self.call_sync(args)
    }
}

/// Name of the first `fn` declared in source order
pub fn first_function_name(source: &str) -> Option<String> {
    fn_decl_regex()
        .captures(source)
        .map(|caps| caps[1].to_string())
}

/// The contiguous `///` block directly above `fn <name>(`
fn doc_comment_for(source: &str, name: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let Some(decl) = lines.iter().position(|line| {
        fn_decl_regex()
            .captures(line)
            .is_some_and(|caps| &caps[1] == name)
    }) else {
        return String::new();
    };

    let mut doc: Vec<&str> = lines[..decl]
        .iter()
        .rev()
        .map(|line| line.trim())
        .take_while(|line| line.starts_with("///"))
        .map(|line| {
            let body = &line[3..];
            body.strip_prefix(' ').unwrap_or(body)
        })
        .collect();
    doc.reverse();
    doc.join("\n")
}

/// Parsed doc block: full text plus the `# Parameters` entries
#[derive(Debug, Default)]
struct DocBlock {
    text: String,
    params: Vec<Param>,
}

impl DocBlock {
    fn parse(text: &str) -> Self {
        let mut params = Vec::new();
        let mut in_params = false;

        for line in text.lines() {
            let line = line.trim();
            if let Some(heading) = line.strip_prefix('#') {
                let heading = heading.trim_start_matches('#').trim().to_ascii_lowercase();
                in_params = matches!(heading.as_str(), "parameters" | "arguments" | "args");
                continue;
            }
            if !in_params {
                continue;
            }
            let Some(entry) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) else {
                continue;
            };
            if let Some(param) = parse_param_entry(entry) {
                params.push(param);
            }
        }

        Self {
            text: text.trim().to_string(),
            params,
        }
    }

    /// Declared parameter for `name`, or an untyped required one
    fn param(&self, name: &str) -> Param {
        self.params
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .unwrap_or_else(|| Param::required(name, ParamType::Any))
    }
}

/// `n: int = 2 - description`
fn parse_param_entry(entry: &str) -> Option<Param> {
    let (name, rest) = entry.split_once(':')?;
    let name = name.trim().trim_matches('`');
    let (decl, description) = match rest.split_once(" - ") {
        Some((decl, description)) => (decl, description.trim()),
        None => (rest, ""),
    };
    let (type_tag, default) = match decl.split_once('=') {
        Some((type_tag, default)) => (type_tag, Some(parse_lenient(default.trim()))),
        None => (decl, None),
    };
    let param_type = type_tag
        .trim()
        .trim_matches('`')
        .parse::<ParamType>()
        .unwrap_or(ParamType::Any);

    let param = match default {
        Some(default) => Param::optional(name, param_type, default),
        None => Param::required(name, param_type),
    };
    Some(param.with_description(description))
}
