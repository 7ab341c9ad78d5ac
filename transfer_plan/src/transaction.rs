/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Planned data-movement operations.
//!
//! A `Transaction` is created by the builder with a fixed identity (its
//! `RequestKind` and endpoints). The execution stage later records one
//! `SizeTiming` per tested payload size, and the bandwidth calculator
//! appends one `SizeResult` per size.

use enum_as_inner::EnumAsInner;
use serde::Deserialize;
use serde::Serialize;

use crate::topology::AgentHandle;
use crate::topology::KernelHandle;
use crate::topology::PoolHandle;

/// The family a transaction was requested under.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::EnumIter,
    strum::Display
)]
pub enum RequestKind {
    Read,
    Write,
    UnidirectionalCopy,
    BidirectionalCopy,
    /// Sweep over every pool pair, skipping pairs without a path.
    AllPoolsUnidirectionalCopy,
    AllPoolsBidirectionalCopy,
}

impl RequestKind {
    pub fn is_copy(&self) -> bool {
        !matches!(self, RequestKind::Read | RequestKind::Write)
    }

    pub fn is_bidirectional(&self) -> bool {
        matches!(
            self,
            RequestKind::BidirectionalCopy | RequestKind::AllPoolsBidirectionalCopy
        )
    }

    pub fn is_all_pools(&self) -> bool {
        matches!(
            self,
            RequestKind::AllPoolsUnidirectionalCopy | RequestKind::AllPoolsBidirectionalCopy
        )
    }
}

/// A read or write issued by an agent against a pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelTransfer {
    pub pool_index: usize,
    pub pool: PoolHandle,
    pub agent_index: usize,
    pub agent: AgentHandle,
    /// Whether the executing agent is an accelerator.
    pub uses_accelerator: bool,
    /// Compiled program, filled in by the execution stage.
    pub kernel: Option<KernelHandle>,
}

/// A copy between two pools.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyTransfer {
    pub src_index: usize,
    pub dst_index: usize,
    pub src_pool: PoolHandle,
    pub dst_pool: PoolHandle,
    pub bidir: bool,
    /// Whether either endpoint is owned by an accelerator.
    pub uses_accelerator: bool,
}

impl CopyTransfer {
    /// Copies within a single pool move the payload twice.
    pub fn is_same_pool(&self) -> bool {
        self.src_index == self.dst_index
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, EnumAsInner)]
pub enum TransferOp {
    Kernel(KernelTransfer),
    Copy(CopyTransfer),
}

impl TransferOp {
    pub fn uses_accelerator(&self) -> bool {
        match self {
            TransferOp::Kernel(kernel) => kernel.uses_accelerator,
            TransferOp::Copy(copy) => copy.uses_accelerator,
        }
    }
}

/// Errors reducing raw timing samples.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TimingError {
    #[error("no samples left after discarding {warmup} warm-up iterations of {total}")]
    NoSamples { warmup: usize, total: usize },

    #[error("host recorded {host} samples but device recorded {device}")]
    SampleCountMismatch { host: usize, device: usize },
}

/// Timing measured for one payload size. Host times are in seconds,
/// device times in timestamp ticks.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SizeTiming {
    pub host_min: f64,
    pub host_avg: f64,
    pub device_min: f64,
    pub device_avg: f64,
}

impl SizeTiming {
    /// Reduce per-iteration samples to minimum and mean, discarding the
    /// first `warmup` iterations. `device_ticks` may be empty when no
    /// accelerator timestamps were collected.
    pub fn from_samples(
        host_secs: &[f64],
        device_ticks: &[f64],
        warmup: usize,
    ) -> Result<Self, TimingError> {
        if !device_ticks.is_empty() && device_ticks.len() != host_secs.len() {
            return Err(TimingError::SampleCountMismatch {
                host: host_secs.len(),
                device: device_ticks.len(),
            });
        }
        if host_secs.len() <= warmup {
            return Err(TimingError::NoSamples {
                warmup,
                total: host_secs.len(),
            });
        }
        let (host_min, host_avg) = min_and_mean(&host_secs[warmup..]);
        let (device_min, device_avg) = if device_ticks.is_empty() {
            (0.0, 0.0)
        } else {
            min_and_mean(&device_ticks[warmup..])
        };
        Ok(Self {
            host_min,
            host_avg,
            device_min,
            device_avg,
        })
    }
}

// Callers guarantee `samples` is non-empty.
fn min_and_mean(samples: &[f64]) -> (f64, f64) {
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    (min, mean)
}

/// Derived figures for one payload size.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeResult {
    /// Nominal payload size in bytes.
    pub size: usize,
    /// Seconds.
    pub min_time: f64,
    /// Seconds.
    pub avg_time: f64,
    /// Decimal gigabytes per second.
    pub avg_bandwidth: f64,
    /// Decimal gigabytes per second.
    pub peak_bandwidth: f64,
}

/// One planned data-movement operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    kind: RequestKind,
    op: TransferOp,
    timings: Vec<SizeTiming>,
    results: Vec<SizeResult>,
}

impl Transaction {
    pub(crate) fn new(kind: RequestKind, op: TransferOp) -> Self {
        Self {
            kind,
            op,
            timings: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn op(&self) -> &TransferOp {
        &self.op
    }

    pub fn timings(&self) -> &[SizeTiming] {
        &self.timings
    }

    pub fn results(&self) -> &[SizeResult] {
        &self.results
    }

    /// `(src_pool_index, dst_pool_index)` for copies.
    pub fn copy_endpoints(&self) -> Option<(usize, usize)> {
        self.op
            .as_copy()
            .map(|copy| (copy.src_index, copy.dst_index))
    }

    /// Attach the compiled program of a read or write. Returns false for
    /// copies, which run without a kernel.
    pub fn attach_kernel(&mut self, kernel: KernelHandle) -> bool {
        match self.op.as_kernel_mut() {
            Some(transfer) => {
                transfer.kernel = Some(kernel);
                true
            }
            None => false,
        }
    }

    /// Append the timing of the next tested size.
    pub fn record_timing(&mut self, timing: SizeTiming) {
        self.timings.push(timing);
    }

    /// Drop recorded timings and derived results, e.g. before a rerun.
    pub fn clear_timings(&mut self) {
        self.timings.clear();
        self.results.clear();
    }

    pub(crate) fn push_result(&mut self, result: SizeResult) {
        self.results.push(result);
    }
}
