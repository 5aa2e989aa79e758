// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! WaaS server - custodial EVM wallet service
//!
//! Each account holds one server-generated signing key, encrypted at rest.
//! Users authenticate with email and password, receive a short-lived HS256
//! session token, and move value either by a directly signed transfer or
//! through a paymaster-sponsored ERC-4337 smart account.
//!
//! ## Modules
//!
//! - `api` - HTTP handlers, router and OpenAPI document (Axum)
//! - `auth` - session tokens and request extractors
//! - `blockchain` - EVM node, bundler and paymaster clients
//! - `custody` - password hashing, key encryption, account lifecycle
//! - `execution` - direct and sponsored transfer execution
//! - `limits` - request rate limiting and sponsored daily spend
//! - `storage` - user record store (redb or JSON file)

pub mod api;
pub mod auth;
pub mod blockchain;
pub mod config;
pub mod custody;
pub mod error;
pub mod execution;
pub mod limits;
pub mod logging;
pub mod models;
pub mod state;
pub mod storage;
