/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Which transaction families a run asks for, and the selection lists
//! feeding them.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::topology::DeviceType;
use crate::topology::Topology;
use crate::transaction::RequestKind;

/// Order in which requested families are built. Transactions appear in the
/// plan in this order.
pub const FAMILY_ORDER: [RequestKind; 6] = [
    RequestKind::Read,
    RequestKind::Write,
    RequestKind::BidirectionalCopy,
    RequestKind::UnidirectionalCopy,
    RequestKind::AllPoolsBidirectionalCopy,
    RequestKind::AllPoolsUnidirectionalCopy,
];

/// The user's requests, as produced by argument parsing.
///
/// Read and write lists hold alternating `(pool, agent)` index pairs. The
/// copy lists hold pool indices. Plain and all-pools copies of the same
/// direction share their lists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequests {
    pub requested: BTreeSet<RequestKind>,
    pub read_list: Vec<usize>,
    pub write_list: Vec<usize>,
    pub src_list: Vec<usize>,
    pub dst_list: Vec<usize>,
    pub bidir_list: Vec<usize>,
}

impl TransferRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request reads of `(pool, agent)` pairs.
    pub fn read(mut self, pairs: &[(usize, usize)]) -> Self {
        self.requested.insert(RequestKind::Read);
        self.read_list = flatten(pairs);
        self
    }

    /// Request writes of `(pool, agent)` pairs.
    pub fn write(mut self, pairs: &[(usize, usize)]) -> Self {
        self.requested.insert(RequestKind::Write);
        self.write_list = flatten(pairs);
        self
    }

    /// Request unidirectional copies from every pool in `src` to every pool
    /// in `dst`.
    pub fn unidirectional(mut self, src: Vec<usize>, dst: Vec<usize>) -> Self {
        self.requested.insert(RequestKind::UnidirectionalCopy);
        self.src_list = src;
        self.dst_list = dst;
        self
    }

    /// Request bidirectional copies between every pair of pools in `pools`.
    pub fn bidirectional(mut self, pools: Vec<usize>) -> Self {
        self.requested.insert(RequestKind::BidirectionalCopy);
        self.bidir_list = pools;
        self
    }

    /// Request a unidirectional sweep over every eligible pool.
    pub fn all_pools_unidirectional(mut self, topology: &Topology, skip_fine_grain: bool) -> Self {
        let kind = RequestKind::AllPoolsUnidirectionalCopy;
        self.requested.insert(kind);
        self.src_list = select_all_pools(topology, kind, skip_fine_grain);
        self.dst_list = self.src_list.clone();
        self
    }

    /// Request a bidirectional sweep over every eligible pool.
    pub fn all_pools_bidirectional(mut self, topology: &Topology, skip_fine_grain: bool) -> Self {
        let kind = RequestKind::AllPoolsBidirectionalCopy;
        self.requested.insert(kind);
        self.bidir_list = select_all_pools(topology, kind, skip_fine_grain);
        self
    }

    pub fn is_requested(&self, kind: RequestKind) -> bool {
        self.requested.contains(&kind)
    }

    /// The requested families in build order.
    pub fn families(&self) -> impl Iterator<Item = RequestKind> + '_ {
        FAMILY_ORDER
            .into_iter()
            .filter(|kind| self.is_requested(*kind))
    }
}

fn flatten(pairs: &[(usize, usize)]) -> Vec<usize> {
    pairs
        .iter()
        .flat_map(|(pool, agent)| [*pool, *agent])
        .collect()
}

/// Whether a pool is left out of an all-pools sweep. Only host pools are
/// ever excluded: coarse-grained ones by default, fine-grained ones when
/// `skip_fine_grain` is set. Other request kinds exclude nothing.
pub fn filter_cpu_pool(
    kind: RequestKind,
    device_type: DeviceType,
    fine_grained: bool,
    skip_fine_grain: bool,
) -> bool {
    if !kind.is_all_pools() || !device_type.is_host() {
        return false;
    }
    if skip_fine_grain {
        fine_grained
    } else {
        !fine_grained
    }
}

/// Every pool index that survives [`filter_cpu_pool`] for `kind`, in pool
/// order.
pub fn select_all_pools(topology: &Topology, kind: RequestKind, skip_fine_grain: bool) -> Vec<usize> {
    topology
        .pools()
        .iter()
        .filter(|pool| {
            topology.agent(pool.agent_index).is_ok_and(|agent| {
                !filter_cpu_pool(kind, agent.device_type, pool.fine_grained, skip_fine_grain)
            })
        })
        .map(|pool| pool.index)
        .collect()
}
