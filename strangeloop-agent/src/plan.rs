//! Decoding the model's decision reply.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strangeloop_runtime::{strip_code_fences, Error, Result};

/// The single action the model chose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionPlan {
    UseCapability {
        #[serde(rename = "capability")]
        name: String,
        #[serde(default)]
        arguments: Vec<Value>,
        #[serde(default, rename = "explanation")]
        rationale: String,
    },
    CreateCapability {
        description: String,
        #[serde(default, rename = "explanation")]
        rationale: String,
    },
    DirectResponse {
        #[serde(rename = "response")]
        text: String,
        #[serde(default, rename = "explanation")]
        rationale: String,
    },
}

impl ActionPlan {
    /// Decode a reply, tolerating a surrounding markdown fence
    ///
    /// A bare JSON reply is decoded as is, so fences inside string values
    /// are left alone.
    pub fn parse(reply: &str) -> Result<Self> {
        if let Ok(plan) = serde_json::from_str(reply.trim()) {
            return Ok(plan);
        }
        serde_json::from_str(strip_code_fences(reply)).map_err(|e| {
            Error::plan_parse(format!("model reply is not a valid action plan: {}", e), reply)
                .with_operation("plan::parse")
                .set_source(e)
        })
    }

    pub fn rationale(&self) -> &str {
        match self {
            ActionPlan::UseCapability { rationale, .. }
            | ActionPlan::CreateCapability { rationale, .. }
            | ActionPlan::DirectResponse { rationale, .. } => rationale,
        }
    }
}
