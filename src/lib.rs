// SPDX-License-Identifier: MIT

//! Triage workflow orchestration: a typed state graph with checkpoints,
//! the intake and triage agents that run on it, and an HTTP façade.

pub mod adk;
pub mod triageflow;
