/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Topology fixtures shared by the unit tests.

use crate::topology::AccessMatrix;
use crate::topology::Agent;
use crate::topology::AgentHandle;
use crate::topology::DeviceType;
use crate::topology::Pool;
use crate::topology::PoolHandle;
use crate::topology::Topology;

/// Build a topology from agent kinds, `(owner, fine_grained)` per pool, and
/// a row-major access matrix. Handles are derived from indices so that
/// they are distinct and easy to recognize in assertions.
pub fn topology(devices: &[DeviceType], pools: &[(usize, bool)], matrix: Vec<u32>) -> Topology {
    let agents = devices
        .iter()
        .enumerate()
        .map(|(index, device_type)| Agent {
            handle: AgentHandle(0x100 + index as u64),
            device_type: *device_type,
            index,
        })
        .collect();
    let pools = pools
        .iter()
        .enumerate()
        .map(|(index, (agent_index, fine_grained))| Pool {
            handle: PoolHandle(0x200 + index as u64),
            agent_index: *agent_index,
            fine_grained: *fine_grained,
            index,
        })
        .collect();
    let matrix = AccessMatrix::new(devices.len(), matrix).unwrap();
    Topology::new(agents, pools, matrix).unwrap()
}

/// Agent 0 is the host, agent 1 an accelerator; each owns one pool and
/// every path exists.
pub fn host_and_gpu() -> Topology {
    topology(
        &[DeviceType::Cpu, DeviceType::Gpu],
        &[(0, true), (1, false)],
        vec![1, 1, 1, 1],
    )
}

/// Two hosts (one coarse and one fine-grained pool each) and two
/// accelerators (one pool each). Accelerator 3 cannot reach accelerator 2.
///
/// Pools: 0,1 -> agent 0; 2,3 -> agent 1; 4 -> agent 2; 5 -> agent 3.
pub fn two_hosts_two_gpus() -> Topology {
    #[rustfmt::skip]
    let matrix = vec![
        1, 1, 1, 1,
        1, 1, 1, 1,
        1, 1, 1, 1,
        1, 1, 0, 1,
    ];
    topology(
        &[
            DeviceType::Cpu,
            DeviceType::Cpu,
            DeviceType::Gpu,
            DeviceType::Gpu,
        ],
        &[
            (0, false),
            (0, true),
            (1, false),
            (1, true),
            (2, false),
            (3, false),
        ],
        matrix,
    )
}
