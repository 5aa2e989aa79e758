// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! once at startup; a missing required variable or a malformed value is
//! fatal.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `JWT_SECRET` | Session signing and key-derivation secret | Required |
//! | `RPC_URL` | Chain JSON-RPC endpoint | Required |
//! | `USDC_CONTRACT_ADDRESS` | Fungible token contract | Required |
//! | `TOKEN_SYMBOL` | Symbol that selects the token in send requests | `USDC` |
//! | `CHAIN_ID` | EIP-155 chain id | `84532` |
//! | `BICONOMY_BUNDLER_URL` | ERC-4337 bundler endpoint | Optional |
//! | `BICONOMY_PAYMASTER_URL` | Sponsoring paymaster endpoint | Optional |
//! | `ENTRY_POINT_ADDRESS` | v0.6 EntryPoint | `0x5FF1…2789` |
//! | `SMART_ACCOUNT_FACTORY_ADDRESS` | SimpleAccountFactory | `0x9406…6454` |
//! | `SPONSORED_DAILY_LIMIT` | Daily sponsored cap, base units | Unlimited |
//! | `SPEND_RETENTION_DAYS` | Days of spend counters kept | `2` |
//! | `RATE_LIMIT_PER_MINUTE` | Requests per client IP per minute | `120` |
//! | `DATABASE_PATH` | redb file; selects the database backend | Optional |
//! | `DATA_DIR` | Directory for `users.json` | `server/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `4000` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files; both enable HTTPS | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::{net::SocketAddr, path::PathBuf, str::FromStr};

use alloy::primitives::{Address, U256};
use url::Url;

use crate::blockchain::{
    AccountAbstractionConfig, NetworkConfig, TokenConfig, DEFAULT_CHAIN_ID, ENTRY_POINT_V06,
    SIMPLE_ACCOUNT_FACTORY_V06,
};
use crate::limits::{rate::DEFAULT_REQUESTS_PER_MINUTE, spend::DEFAULT_RETENTION_DAYS};
use crate::logging::LogFormat;

pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const RPC_URL_ENV: &str = "RPC_URL";
pub const TOKEN_ADDRESS_ENV: &str = "USDC_CONTRACT_ADDRESS";
pub const TOKEN_SYMBOL_ENV: &str = "TOKEN_SYMBOL";
pub const CHAIN_ID_ENV: &str = "CHAIN_ID";
pub const BUNDLER_URL_ENV: &str = "BICONOMY_BUNDLER_URL";
pub const PAYMASTER_URL_ENV: &str = "BICONOMY_PAYMASTER_URL";
pub const ENTRY_POINT_ENV: &str = "ENTRY_POINT_ADDRESS";
pub const FACTORY_ENV: &str = "SMART_ACCOUNT_FACTORY_ADDRESS";
pub const SPONSORED_DAILY_LIMIT_ENV: &str = "SPONSORED_DAILY_LIMIT";
pub const SPEND_RETENTION_DAYS_ENV: &str = "SPEND_RETENTION_DAYS";
pub const RATE_LIMIT_ENV: &str = "RATE_LIMIT_PER_MINUTE";

/// Environment variable name for the redb database file.
///
/// When set, accounts are stored in a single redb file at this path instead
/// of `users.json`.
pub const DATABASE_PATH_ENV: &str = "DATABASE_PATH";

/// Environment variable name for the JSON file store directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = "server/data";

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 4000;

pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";

pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_TOKEN_SYMBOL: &str = "USDC";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Where account records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Redb(PathBuf),
    JsonFile(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Fully validated process configuration.
#[derive(Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub network: NetworkConfig,
    pub token: TokenConfig,
    pub account_abstraction: Option<AccountAbstractionConfig>,
    pub sponsored_daily_limit: Option<U256>,
    pub spend_retention_days: u32,
    pub rate_limit_per_minute: u32,
    pub storage: StorageBackend,
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsPaths>,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let jwt_secret = require(JWT_SECRET_ENV)?;
        let network = NetworkConfig {
            rpc_url: parse_url(RPC_URL_ENV, &require(RPC_URL_ENV)?)?,
            chain_id: parse_or(CHAIN_ID_ENV, get(CHAIN_ID_ENV), DEFAULT_CHAIN_ID)?,
        };
        let token = TokenConfig {
            address: parse_address(TOKEN_ADDRESS_ENV, &require(TOKEN_ADDRESS_ENV)?)?,
            symbol: get(TOKEN_SYMBOL_ENV).unwrap_or_else(|| DEFAULT_TOKEN_SYMBOL.to_string()),
        };

        let account_abstraction = match (get(BUNDLER_URL_ENV), get(PAYMASTER_URL_ENV)) {
            (Some(bundler), Some(paymaster)) => Some(AccountAbstractionConfig {
                bundler_url: parse_url(BUNDLER_URL_ENV, &bundler)?,
                paymaster_url: parse_url(PAYMASTER_URL_ENV, &paymaster)?,
                entry_point: match get(ENTRY_POINT_ENV) {
                    Some(raw) => parse_address(ENTRY_POINT_ENV, &raw)?,
                    None => ENTRY_POINT_V06,
                },
                factory: match get(FACTORY_ENV) {
                    Some(raw) => parse_address(FACTORY_ENV, &raw)?,
                    None => SIMPLE_ACCOUNT_FACTORY_V06,
                },
            }),
            (None, None) => None,
            _ => {
                tracing::warn!(
                    "only one of {BUNDLER_URL_ENV} and {PAYMASTER_URL_ENV} is set; account abstraction disabled"
                );
                None
            }
        };

        let sponsored_daily_limit = get(SPONSORED_DAILY_LIMIT_ENV)
            .map(|raw| {
                U256::from_str(&raw).map_err(|e| ConfigError::Invalid {
                    var: SPONSORED_DAILY_LIMIT_ENV,
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let storage = match get(DATABASE_PATH_ENV) {
            Some(path) => StorageBackend::Redb(PathBuf::from(path)),
            None => StorageBackend::JsonFile(PathBuf::from(
                get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            )),
        };

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert_path: cert.into(),
                key_path: key.into(),
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    var: TLS_CERT_PATH_ENV,
                    reason: format!("{TLS_CERT_PATH_ENV} and {TLS_KEY_PATH_ENV} must be set together"),
                })
            }
        };

        let log_format = match get(LOG_FORMAT_ENV) {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                var: LOG_FORMAT_ENV,
                reason,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            jwt_secret,
            network,
            token,
            account_abstraction,
            sponsored_daily_limit,
            spend_retention_days: parse_or(
                SPEND_RETENTION_DAYS_ENV,
                get(SPEND_RETENTION_DAYS_ENV),
                DEFAULT_RETENTION_DAYS,
            )?,
            rate_limit_per_minute: parse_or(
                RATE_LIMIT_ENV,
                get(RATE_LIMIT_ENV),
                DEFAULT_REQUESTS_PER_MINUTE,
            )?,
            storage,
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(PORT_ENV, get(PORT_ENV), DEFAULT_PORT)?,
            tls,
            log_format,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: HOST_ENV,
                reason: e.to_string(),
            })
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("jwt_secret", &"<redacted>")
            .field("network", &self.network)
            .field("token", &self.token)
            .field("account_abstraction", &self.account_abstraction)
            .field("sponsored_daily_limit", &self.sponsored_daily_limit)
            .field("spend_retention_days", &self.spend_retention_days)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("storage", &self.storage)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("log_format", &self.log_format)
            .finish()
    }
}

fn parse_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })
}

fn parse_address(var: &'static str, raw: &str) -> Result<Address, ConfigError> {
    Address::from_str(raw).map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
