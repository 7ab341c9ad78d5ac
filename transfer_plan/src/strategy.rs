/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Property-based generators for [`Topology`] and copy requests.
//!
//! Generated topologies mix host and accelerator agents, give every
//! agent-to-agent path a random chance of being absent, and assign pools to
//! arbitrary owners with arbitrary grain, so that every filter of the
//! builder is exercised.
//!
//! This module is only included in test builds (`#[cfg(test)]`).

use proptest::prelude::*;

use crate::test_utils;
use crate::topology::DeviceType;
use crate::topology::Topology;
use crate::transaction::RequestKind;

/// Generates a topology with between 1 and `max_agents` agents and between
/// 1 and `max_agents * max_pools_per_agent` pools.
pub fn gen_topology(
    max_agents: usize,
    max_pools_per_agent: usize,
) -> impl Strategy<Value = Topology> {
    (1..=max_agents)
        .prop_flat_map(move |agents| {
            (
                prop::collection::vec(
                    prop_oneof![Just(DeviceType::Cpu), Just(DeviceType::Gpu)],
                    agents,
                ),
                prop::collection::vec((0..agents, any::<bool>()), 1..=agents * max_pools_per_agent),
                prop::collection::vec(0u32..=1, agents * agents),
            )
        })
        .prop_map(|(devices, pools, cells)| test_utils::topology(&devices, &pools, cells))
}

/// Generates one of the four copy request kinds.
pub fn gen_copy_kind() -> impl Strategy<Value = RequestKind> {
    prop::sample::select(vec![
        RequestKind::UnidirectionalCopy,
        RequestKind::BidirectionalCopy,
        RequestKind::AllPoolsUnidirectionalCopy,
        RequestKind::AllPoolsBidirectionalCopy,
    ])
}

/// Generates `(topology, kind, src_list, dst_list)` with up to `max_list`
/// valid pool indices per list. Bidirectional kinds use one list for both
/// sides, as the request parser does.
pub fn gen_copy_request(
    max_agents: usize,
    max_pools_per_agent: usize,
    max_list: usize,
) -> impl Strategy<Value = (Topology, RequestKind, Vec<usize>, Vec<usize>)> {
    gen_topology(max_agents, max_pools_per_agent)
        .prop_flat_map(move |topology| {
            let pools = topology.pools().len();
            (
                Just(topology),
                gen_copy_kind(),
                prop::collection::vec(0..pools, 0..=max_list),
                prop::collection::vec(0..pools, 0..=max_list),
            )
        })
        .prop_map(|(topology, kind, src, dst)| {
            if kind.is_bidirectional() {
                (topology, kind, src.clone(), src)
            } else {
                (topology, kind, src, dst)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_topology_properties(topology in gen_topology(4, 3)) {
            let agents = topology.agents().len();
            prop_assert!((1..=4).contains(&agents));
            prop_assert!(!topology.pools().is_empty());
            prop_assert_eq!(topology.access_matrix().agents(), agents);
        }

        #[test]
        fn test_copy_request_lists(
            (topology, kind, src, dst) in gen_copy_request(4, 2, 5)
        ) {
            let pools = topology.pools().len();
            prop_assert!(src.iter().chain(&dst).all(|pool| *pool < pools));
            if kind.is_bidirectional() {
                prop_assert_eq!(src, dst);
            }
        }
    }
}
