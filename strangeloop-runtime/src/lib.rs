//! # strangeloop runtime
//!
//! Everything the agent shell needs below the dispatcher.
//!
//! ## Core Concepts
//! - **Config Store**: flat JSON key-value settings under the config root
//! - **Provider**: one-shot text completion against the hosted model
//! - **Capability**: named, introspectable, callable unit (native or script)
//! - **Registry**: synthesis, injection and persistence of capabilities
//! - **Context**: config and registry built once per process

pub mod builtin;
pub mod capability;
pub mod config;
pub mod context;
pub mod error;
pub mod fence;
pub mod paths;
pub mod provider;
pub mod registry;
pub mod script;

pub use capability::{
    is_valid_name, parse_lenient, Capability, CapabilityMeta, Origin, Param, ParamType, Signature,
};
pub use config::ConfigStore;
pub use context::Context;
pub use error::{Error, ErrorKind, Result};
pub use fence::strip_code_fences;
pub use provider::{AnthropicProvider, CompletionProvider, CompletionRequest};
pub use registry::Registry;
pub use script::{ScriptCapability, ScriptHost};
