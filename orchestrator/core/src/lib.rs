// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! A2A Mesh Core
//!
//! Capability-routed agent fabric. Agents announce versioned capabilities to
//! the registry; every message goes through the router, which resolves a
//! healthy agent, guards it with a circuit breaker and enforces deadlines.
//! Workflows compose capabilities into dependency graphs, and the gateways
//! expose commerce, analytics and inference operations to external clients.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, application services, adapters and HTTP API

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;
