/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Converts the timings of an executed transaction into bandwidth figures.

use crate::config::PlanConfig;
use crate::transaction::SizeResult;
use crate::transaction::Transaction;
use crate::transaction::TransferOp;

/// Bandwidths are reported in decimal gigabytes.
pub const BYTES_PER_GB: f64 = 1e9;

/// Computes per-size bandwidth for executed transactions.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BandwidthCalculator {
    /// Device timestamp ticks per second.
    sys_freq: u64,
    prefer_host_timing: bool,
}

impl BandwidthCalculator {
    pub fn new(sys_freq: u64, prefer_host_timing: bool) -> Self {
        Self {
            sys_freq,
            prefer_host_timing,
        }
    }

    pub fn from_config(sys_freq: u64, config: &PlanConfig) -> Self {
        Self::new(sys_freq, config.prefer_host_timing)
    }

    /// Append one [`SizeResult`] per entry of `sizes` to `trans`.
    ///
    /// The byte count is doubled for bidirectional copies, and doubled again
    /// when a copy stays within one pool. Transactions involving an
    /// accelerator use device ticks unless host timing is preferred. A size
    /// with no recorded timing counts as zero time, which yields an
    /// infinite bandwidth rather than an error.
    pub fn compute(&self, trans: &mut Transaction, sizes: &[usize]) {
        let (bidir, same_pool) = match trans.op() {
            TransferOp::Copy(copy) => (copy.bidir, copy.is_same_pool()),
            TransferOp::Kernel(_) => (false, false),
        };
        let use_device_time = trans.op().uses_accelerator() && !self.prefer_host_timing;
        let sys_freq = self.sys_freq as f64;

        for (idx, &size) in sizes.iter().enumerate() {
            let timing = trans.timings().get(idx).copied().unwrap_or_default();

            // Doubled in floating point so that huge sizes cannot overflow.
            let mut data_size = size as f64;
            if bidir {
                data_size *= 2.0;
            }
            if same_pool {
                data_size *= 2.0;
            }

            let (min_time, avg_time) = if use_device_time {
                (timing.device_min / sys_freq, timing.device_avg / sys_freq)
            } else {
                (timing.host_min, timing.host_avg)
            };
            let avg_bandwidth = data_size / avg_time / BYTES_PER_GB;
            let peak_bandwidth = data_size / min_time / BYTES_PER_GB;
            if !avg_bandwidth.is_finite() || !peak_bandwidth.is_finite() {
                tracing::debug!(
                    "{} transaction has non-finite bandwidth for size {}",
                    trans.kind(),
                    size
                );
            }

            trans.push_result(SizeResult {
                size,
                min_time,
                avg_time,
                avg_bandwidth,
                peak_bandwidth,
            });
        }
    }

    /// [`Self::compute`] over a whole plan.
    pub fn compute_all(&self, transactions: &mut [Transaction], sizes: &[usize]) {
        for trans in transactions {
            self.compute(trans, sizes);
        }
    }
}
