// SPDX-License-Identifier: MIT

pub mod agents;
pub mod graphs;
pub mod server;
pub mod workflow;
