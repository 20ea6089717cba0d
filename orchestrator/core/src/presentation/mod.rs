// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`a2a-mesh-core`)
//!
//! HTTP surface that translates external requests into application service
//! calls. Handlers hold no routing or workflow logic of their own.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP/SSE (Axum) | Registry, router, workflow and gateway endpoints + run event streaming |

pub mod api;

pub use api::{app, AppState};
