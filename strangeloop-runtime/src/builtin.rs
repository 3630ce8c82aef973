//! Capabilities bundled with the binary.
//!
//! These are native Rust implementations registered with
//! [`Registry::with_builtins`](crate::registry::Registry::with_builtins).
//! Synthesized capabilities of the same name replace them.

use crate::capability::{Capability, CapabilityMeta, Origin, Param, ParamType, Signature};
use crate::error::{Error, Result};
use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const LOOKUP_TIMEOUT_SECS: u64 = 10;
const IP_LOOKUP_URL: &str = "https://httpbin.org/ip";
const BITCOIN_PRICE_URL: &str = "https://api.coingecko.com/api/v3/simple/price";
const MAX_PASSWORD_LENGTH: i64 = 4096;
const DEFAULT_SPECIAL_CHARS: &str = "!@#$%^&*()_-+=<>?/[]{}|";

/// Every bundled capability
pub fn all() -> Vec<Arc<dyn Capability>> {
    vec![
        Arc::new(SecurePassword::new()),
        Arc::new(PublicIp::new()),
        Arc::new(BitcoinPrice::new()),
    ]
}

fn builtin_meta(name: &str, params: Vec<Param>, documentation: &str) -> CapabilityMeta {
    CapabilityMeta {
        name: name.to_string(),
        signature: Signature::new(params),
        documentation: documentation.to_string(),
        source: None,
        origin: Origin::Builtin,
    }
}

fn lookup_client(name: &str) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(LOOKUP_TIMEOUT_SECS))
        .build()
        .map_err(|e| Error::runtime_failure(name, format!("failed to create HTTP client: {}", e)))
}

fn int_arg(name: &str, args: &[Value], index: usize, param: &str) -> Result<i64> {
    args.get(index).and_then(Value::as_i64).ok_or_else(|| {
        Error::runtime_failure(name, format!("'{}' must be an integer", param))
    })
}

fn bool_arg(name: &str, args: &[Value], index: usize, param: &str) -> Result<bool> {
    args.get(index).and_then(Value::as_bool).ok_or_else(|| {
        Error::runtime_failure(name, format!("'{}' must be a boolean", param))
    })
}

fn str_arg<'a>(name: &str, args: &'a [Value], index: usize, param: &str) -> Result<&'a str> {
    args.get(index).and_then(Value::as_str).ok_or_else(|| {
        Error::runtime_failure(name, format!("'{}' must be a string", param))
    })
}

// ============================================================================
// generate_secure_password
// ============================================================================

/// Random password from a configurable character pool
pub struct SecurePassword {
    meta: CapabilityMeta,
}

impl Default for SecurePassword {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurePassword {
    pub fn new() -> Self {
        let params = vec![
            Param::optional("length", ParamType::Int, json!(16))
                .with_description("number of characters"),
            Param::optional("include_uppercase", ParamType::Bool, json!(true)),
            Param::optional("include_lowercase", ParamType::Bool, json!(true)),
            Param::optional("include_digits", ParamType::Bool, json!(true)),
            Param::optional("include_special_chars", ParamType::Bool, json!(true)),
            Param::optional("special_chars", ParamType::String, json!(DEFAULT_SPECIAL_CHARS))
                .with_description("pool used when special characters are enabled"),
        ];
        Self {
            meta: builtin_meta(
                "generate_secure_password",
                params,
                "Generate a random secure password with configurable length and character types.\n\n\
                 Fails when length is below 1 or every character class is disabled.",
            ),
        }
    }

    fn generate(&self, args: &[Value]) -> Result<String> {
        let name = self.meta.name.as_str();
        let length = int_arg(name, args, 0, "length")?;
        if length < 1 {
            return Err(Error::runtime_failure(
                name,
                "password length must be at least 1 character",
            ));
        }
        if length > MAX_PASSWORD_LENGTH {
            return Err(Error::runtime_failure(
                name,
                format!("password length must be at most {} characters", MAX_PASSWORD_LENGTH),
            ));
        }

        let mut pool: Vec<char> = Vec::new();
        if bool_arg(name, args, 1, "include_uppercase")? {
            pool.extend('A'..='Z');
        }
        if bool_arg(name, args, 2, "include_lowercase")? {
            pool.extend('a'..='z');
        }
        if bool_arg(name, args, 3, "include_digits")? {
            pool.extend('0'..='9');
        }
        if bool_arg(name, args, 4, "include_special_chars")? {
            pool.extend(str_arg(name, args, 5, "special_chars")?.chars());
        }

        let mut rng = OsRng;
        (0..length)
            .map(|_| pool.choose(&mut rng).copied())
            .collect::<Option<String>>()
            .ok_or_else(|| {
                Error::runtime_failure(name, "at least one character type must be selected")
            })
    }
}

#[async_trait]
impl Capability for SecurePassword {
    fn meta(&self) -> &CapabilityMeta {
        &self.meta
    }

    async fn call(&self, args: Vec<Value>) -> Result<Value> {
        let args = self.meta.signature.coerce(args);
        self.generate(&args).map(Value::String)
    }
}

// ============================================================================
// get_public_ip_address
// ============================================================================

/// Public IP as seen by httpbin; `null` when the lookup fails
pub struct PublicIp {
    meta: CapabilityMeta,
}

impl Default for PublicIp {
    fn default() -> Self {
        Self::new()
    }
}

impl PublicIp {
    pub fn new() -> Self {
        Self {
            meta: builtin_meta(
                "get_public_ip_address",
                Vec::new(),
                "Retrieve the public IP address of this machine via httpbin.org/ip.\n\n\
                 Returns null when the lookup fails.",
            ),
        }
    }

    async fn lookup(&self) -> Result<String> {
        let name = self.meta.name.as_str();
        let body: Value = lookup_client(name)?
            .get(IP_LOOKUP_URL)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::runtime_failure(name, format!("IP lookup failed: {}", e)))?
            .json()
            .await
            .map_err(|e| Error::runtime_failure(name, format!("IP lookup returned bad JSON: {}", e)))?;

        parse_origin(&body).ok_or_else(|| {
            Error::runtime_failure(name, "unexpected response format from httpbin.org/ip")
        })
    }
}

fn parse_origin(body: &Value) -> Option<String> {
    body.get("origin").and_then(Value::as_str).map(str::to_string)
}

#[async_trait]
impl Capability for PublicIp {
    fn meta(&self) -> &CapabilityMeta {
        &self.meta
    }

    async fn call(&self, _args: Vec<Value>) -> Result<Value> {
        match self.lookup().await {
            Ok(ip) => Ok(Value::String(ip)),
            Err(e) => {
                warn!("{}", e);
                Ok(Value::Null)
            }
        }
    }
}

// ============================================================================
// fetch_current_bitcoin_price
// ============================================================================

/// BTC/USD spot price from CoinGecko
pub struct BitcoinPrice {
    meta: CapabilityMeta,
}

impl Default for BitcoinPrice {
    fn default() -> Self {
        Self::new()
    }
}

impl BitcoinPrice {
    pub fn new() -> Self {
        Self {
            meta: builtin_meta(
                "fetch_current_bitcoin_price",
                Vec::new(),
                "Fetch the current Bitcoin spot price in USD from CoinGecko.\n\n\
                 Returns a map with `usd` and `retrieved_at` (RFC 3339).",
            ),
        }
    }
}

fn parse_price(body: &Value) -> Option<f64> {
    body.get("bitcoin")?.get("usd")?.as_f64()
}

#[async_trait]
impl Capability for BitcoinPrice {
    fn meta(&self) -> &CapabilityMeta {
        &self.meta
    }

    async fn call(&self, _args: Vec<Value>) -> Result<Value> {
        let name = self.meta.name.as_str();
        let body: Value = lookup_client(name)?
            .get(BITCOIN_PRICE_URL)
            .query(&[("ids", "bitcoin"), ("vs_currencies", "usd")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                Error::runtime_failure(name, format!("failed to reach Bitcoin price API: {}", e))
            })?
            .json()
            .await
            .map_err(|e| {
                Error::runtime_failure(name, format!("failed to parse Bitcoin price data: {}", e))
            })?;

        let usd = parse_price(&body).ok_or_else(|| {
            Error::runtime_failure(name, "unexpected Bitcoin price API response format")
        })?;
        debug!(usd, "fetched bitcoin price");
        Ok(json!({
            "usd": usd,
            "retrieved_at": chrono::Utc::now().to_rfc3339(),
        }))
    }
}
