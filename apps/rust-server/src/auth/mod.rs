// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Stateless HS256 session tokens issued by the server itself.
//!
//! ## Auth Flow
//!
//! 1. Client signs up or signs in with email and password
//! 2. Server returns `accessToken` (12 hour lifetime)
//! 3. Client sends `Authorization: Bearer <accessToken>`
//! 4. Server verifies signature and expiry on every request and loads the
//!    account named by `sub`
//!
//! ## Security
//!
//! - All wallet endpoints require a session
//! - The signing secret is also the key-derivation input for custodial keys
//! - Clock skew tolerance is 60 seconds

pub mod error;
pub mod extractor;
pub mod session;

pub use error::AuthError;
pub use extractor::{Account, Auth};
pub use session::{SessionClaims, SessionError, SessionManager};
