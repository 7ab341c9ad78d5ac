/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Planning and bandwidth accounting for point-to-point memory transfer
//! benchmarks across host and accelerator agents.
//!
//! The flow is:
//! 1. describe the discovered agents, pools, and access matrix as a
//!    [`Topology`];
//! 2. turn [`TransferRequests`] into a [`TransferPlan`] with a
//!    [`TransactionBuilder`];
//! 3. execute the plan elsewhere, recording a [`SizeTiming`] per tested
//!    size on each transaction;
//! 4. derive bandwidth with a [`BandwidthCalculator`].

pub mod bandwidth;
pub mod builder;
pub mod config;
pub mod request;
pub mod topology;
pub mod transaction;

pub use bandwidth::BandwidthCalculator;
pub use builder::ActiveAgents;
pub use builder::BuildError;
pub use builder::TransactionBuilder;
pub use builder::TransferPlan;
pub use config::PlanConfig;
pub use request::TransferRequests;
pub use topology::*;
pub use transaction::*;

#[cfg(test)]
mod strategy;
#[cfg(test)]
mod test_utils;
