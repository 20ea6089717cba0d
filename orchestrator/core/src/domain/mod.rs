// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer
//!
//! Value objects, aggregates and ports of the mesh. Nothing in here performs
//! I/O; adapters live in `crate::infrastructure`.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Agents, capabilities, envelopes, circuits, workflows

pub mod agent;
pub mod capability;
pub mod circuit;
pub mod envelope;
pub mod events;
pub mod mesh_config;
pub mod repository;
pub mod routing;
pub mod workflow;
