/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Read-only view of the devices and memory pools taking part in a run.
//!
//! Discovery happens elsewhere; this module only describes what was found:
//! - `Agent`: a host processor or an accelerator.
//! - `Pool`: a memory pool owned by exactly one agent.
//! - `AccessMatrix`: which agent-to-agent copy paths the platform permits.
//! - `PoolAccessQuery`: the fine-grained, per agent/pool capability check
//!   consulted when planning reads and writes.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// The type of error for topology construction and lookups.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TopologyError {
    #[error("access matrix has {got} cells, expected {expected} for {agents} agents")]
    MatrixSize {
        agents: usize,
        expected: usize,
        got: usize,
    },

    #[error("pool {pool} is owned by agent {agent}, but only {agents} agents exist")]
    PoolOwnerOutOfRange {
        pool: usize,
        agent: usize,
        agents: usize,
    },

    #[error("agent at position {position} carries index {index}")]
    MisnumberedAgent { position: usize, index: usize },

    #[error("pool at position {position} carries index {index}")]
    MisnumberedPool { position: usize, index: usize },

    #[error("agent index {index} out of range {total}")]
    AgentOutOfRange { index: usize, total: usize },

    #[error("pool index {index} out of range {total}")]
    PoolOutOfRange { index: usize, total: usize },
}

/// Kind of compute device backing an agent.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display
)]
pub enum DeviceType {
    /// A host processor.
    Cpu,
    /// An accelerator.
    Gpu,
}

impl DeviceType {
    pub fn is_host(&self) -> bool {
        matches!(self, DeviceType::Cpu)
    }
}

/// Opaque runtime identifier of an agent.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct AgentHandle(pub u64);

/// Opaque runtime identifier of a memory pool.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PoolHandle(pub u64);

/// Opaque runtime identifier of a compiled read/write kernel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct KernelHandle(pub u64);

/// A compute agent as enumerated by the runtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub handle: AgentHandle,
    pub device_type: DeviceType,
    /// Position of this agent in the topology's agent list.
    pub index: usize,
}

/// A memory pool bound to its owning agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub handle: PoolHandle,
    /// Index of the owning agent.
    pub agent_index: usize,
    /// Fine-grained (coherent) pools are true, coarse-grained pools false.
    pub fine_grained: bool,
    /// Position of this pool in the topology's pool list.
    pub index: usize,
}

/// Square agent-to-agent reachability grid, stored row-major. Cell
/// `(src, dst)` is non-zero when agent `src` can copy into a pool owned by
/// agent `dst`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAccessMatrix")]
pub struct AccessMatrix {
    agents: usize,
    cells: Vec<u32>,
}

impl AccessMatrix {
    pub fn new(agents: usize, cells: Vec<u32>) -> Result<Self, TopologyError> {
        let expected = agents * agents;
        if cells.len() != expected {
            return Err(TopologyError::MatrixSize {
                agents,
                expected,
                got: cells.len(),
            });
        }
        Ok(Self { agents, cells })
    }

    /// A matrix where every agent can reach every other agent.
    pub fn full(agents: usize) -> Self {
        Self {
            agents,
            cells: vec![1; agents * agents],
        }
    }

    pub fn agents(&self) -> usize {
        self.agents
    }

    /// Whether a copy path exists from `src` to `dst`. Out-of-range
    /// indices have no path.
    pub fn path_exists(&self, src: usize, dst: usize) -> bool {
        if src >= self.agents || dst >= self.agents {
            return false;
        }
        self.cells
            .get(src * self.agents + dst)
            .is_some_and(|cell| *cell != 0)
    }
}

/// Unvalidated wire form of [`AccessMatrix`].
#[derive(Deserialize)]
struct RawAccessMatrix {
    agents: usize,
    cells: Vec<u32>,
}

impl TryFrom<RawAccessMatrix> for AccessMatrix {
    type Error = TopologyError;

    fn try_from(raw: RawAccessMatrix) -> Result<Self, Self::Error> {
        Self::new(raw.agents, raw.cells)
    }
}

impl fmt::Display for AccessMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(self.agents.max(1)) {
            let row: Vec<String> = row.iter().map(u32::to_string).collect();
            writeln!(f, "{}", row.join(" "))?;
        }
        Ok(())
    }
}

/// The agents, pools, and access matrix of one run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTopology")]
pub struct Topology {
    agents: Vec<Agent>,
    pools: Vec<Pool>,
    access_matrix: AccessMatrix,
}

/// Unvalidated wire form of [`Topology`].
#[derive(Deserialize)]
struct RawTopology {
    agents: Vec<Agent>,
    pools: Vec<Pool>,
    access_matrix: AccessMatrix,
}

impl TryFrom<RawTopology> for Topology {
    type Error = TopologyError;

    fn try_from(raw: RawTopology) -> Result<Self, Self::Error> {
        Self::new(raw.agents, raw.pools, raw.access_matrix)
    }
}

impl Topology {
    /// Create a new topology, validating that indices are dense and that
    /// the matrix and pool owners agree with the agent list.
    pub fn new(
        agents: Vec<Agent>,
        pools: Vec<Pool>,
        access_matrix: AccessMatrix,
    ) -> Result<Self, TopologyError> {
        if access_matrix.agents() != agents.len() {
            return Err(TopologyError::MatrixSize {
                agents: agents.len(),
                expected: agents.len() * agents.len(),
                got: access_matrix.agents() * access_matrix.agents(),
            });
        }
        for (position, agent) in agents.iter().enumerate() {
            if agent.index != position {
                return Err(TopologyError::MisnumberedAgent {
                    position,
                    index: agent.index,
                });
            }
        }
        for (position, pool) in pools.iter().enumerate() {
            if pool.index != position {
                return Err(TopologyError::MisnumberedPool {
                    position,
                    index: pool.index,
                });
            }
            if pool.agent_index >= agents.len() {
                return Err(TopologyError::PoolOwnerOutOfRange {
                    pool: position,
                    agent: pool.agent_index,
                    agents: agents.len(),
                });
            }
        }
        Ok(Self {
            agents,
            pools,
            access_matrix,
        })
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    pub fn access_matrix(&self) -> &AccessMatrix {
        &self.access_matrix
    }

    pub fn agent(&self, index: usize) -> Result<&Agent, TopologyError> {
        self.agents
            .get(index)
            .ok_or(TopologyError::AgentOutOfRange {
                index,
                total: self.agents.len(),
            })
    }

    pub fn pool(&self, index: usize) -> Result<&Pool, TopologyError> {
        self.pools.get(index).ok_or(TopologyError::PoolOutOfRange {
            index,
            total: self.pools.len(),
        })
    }

    /// The agent owning pool `index`.
    pub fn pool_owner(&self, index: usize) -> Result<&Agent, TopologyError> {
        let pool = self.pool(index)?;
        self.agent(pool.agent_index)
    }
}

/// Answer of the fine-grained accessibility query for an agent/pool pair.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display
)]
pub enum PoolAccess {
    AllowedByDefault,
    /// Reachable once access is explicitly granted.
    DisallowedByDefault,
    NeverAllowed,
}

/// Runtime capability check consulted when planning reads and writes.
pub trait PoolAccessQuery {
    /// Report how `agent` may access `pool`. An `Err` means the query itself
    /// failed, not that access is denied.
    fn pool_access(&self, agent: &Agent, pool: &Pool) -> Result<PoolAccess, anyhow::Error>;
}

/// In-memory `PoolAccessQuery`. Agents may access their own pools by default
/// and need an explicit grant for anything else, unless overridden.
#[derive(Clone, Debug, Default)]
pub struct PoolAccessTable {
    overrides: HashMap<(usize, usize), PoolAccess>,
}

impl PoolAccessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the answer for `(agent, pool)`.
    pub fn set(&mut self, agent: usize, pool: usize, access: PoolAccess) -> &mut Self {
        self.overrides.insert((agent, pool), access);
        self
    }
}

impl PoolAccessQuery for PoolAccessTable {
    fn pool_access(&self, agent: &Agent, pool: &Pool) -> Result<PoolAccess, anyhow::Error> {
        if let Some(access) = self.overrides.get(&(agent.index, pool.index)) {
            return Ok(*access);
        }
        if pool.agent_index == agent.index {
            Ok(PoolAccess::AllowedByDefault)
        } else {
            Ok(PoolAccess::DisallowedByDefault)
        }
    }
}
