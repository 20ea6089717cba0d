// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod health_probe;
pub mod rate_limiter;
pub mod repositories;
pub mod response_cache;
pub mod signing;
pub mod transport;
pub mod workflow_parser;

pub use event_bus::{EventBus, EventBusError};
pub use signing::{MessageSigner, SignatureError};
pub use workflow_parser::WorkflowParser;
