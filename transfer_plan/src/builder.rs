/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Turns the user's requests into an ordered list of transactions.
//!
//! Copy candidates go through three filters, in this order:
//! 1. host-to-host pairs are never benchmarked;
//! 2. bidirectional requests skip pairs whose pools share an owning agent;
//! 3. pairs without a path in the access matrix are skipped by all-pools
//!    sweeps, but abort the build when the pair was requested explicitly.
//!
//! Unidirectional requests keep same-agent pairs, including copies within a
//! single pool, so local bandwidth is measured too.

use serde::Deserialize;
use serde::Serialize;

use crate::request::TransferRequests;
use crate::topology::PoolAccess;
use crate::topology::PoolAccessQuery;
use crate::topology::Topology;
use crate::topology::TopologyError;
use crate::transaction::CopyTransfer;
use crate::transaction::KernelTransfer;
use crate::transaction::RequestKind;
use crate::transaction::Transaction;
use crate::transaction::TransferOp;

/// Errors that abort a build.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BuildError {
    #[error("agent {agent} is never allowed to access pool {pool}")]
    PoolAccessDenied { agent: usize, pool: usize },

    #[error(
        "no copy path from pool {src_pool} (agent {src_agent}) to pool {dst_pool} (agent {dst_agent})"
    )]
    CopyAccessDenied {
        src_pool: usize,
        dst_pool: usize,
        src_agent: usize,
        dst_agent: usize,
    },

    #[error("{kind} list has odd length {len}; expected (pool, agent) pairs")]
    UnpairedList { kind: RequestKind, len: usize },

    #[error("querying access of agent {agent} to pool {pool}: {source}")]
    AccessQuery {
        agent: usize,
        pool: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("{0} is not a copy request")]
    NotACopy(RequestKind),

    #[error("{0} is not a read or write request")]
    NotAKernel(RequestKind),

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Which agents took part in at least one accepted copy. Created once per
/// build pass and sized to the agent count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveAgents {
    active: Vec<bool>,
}

impl ActiveAgents {
    pub fn new(agents: usize) -> Self {
        Self {
            active: vec![false; agents],
        }
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Mark `agent` active. Indices outside the marker are ignored.
    pub fn mark(&mut self, agent: usize) {
        if let Some(slot) = self.active.get_mut(agent) {
            *slot = true;
        }
    }

    pub fn is_active(&self, agent: usize) -> bool {
        self.active.get(agent).copied().unwrap_or(false)
    }

    /// Active agent indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.active
            .iter()
            .enumerate()
            .filter_map(|(index, active)| active.then_some(index))
    }
}

/// The outcome of a build pass, owned by the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferPlan {
    pub transactions: Vec<Transaction>,
    pub active_agents: ActiveAgents,
}

/// Plans transactions over a topology.
pub struct TransactionBuilder<'a, Q> {
    topology: &'a Topology,
    access: &'a Q,
}

impl<'a, Q: PoolAccessQuery> TransactionBuilder<'a, Q> {
    pub fn new(topology: &'a Topology, access: &'a Q) -> Self {
        Self { topology, access }
    }

    /// Build every requested family in [`crate::request::FAMILY_ORDER`],
    /// stopping at the first family that fails.
    pub fn build(&self, requests: &TransferRequests) -> Result<TransferPlan, BuildError> {
        let mut transactions = Vec::new();
        let mut active_agents = ActiveAgents::new(self.topology.agents().len());

        for kind in requests.families() {
            let before = transactions.len();
            match kind {
                RequestKind::Read => {
                    self.build_read_or_write(kind, &requests.read_list, &mut transactions)?
                }
                RequestKind::Write => {
                    self.build_read_or_write(kind, &requests.write_list, &mut transactions)?
                }
                RequestKind::BidirectionalCopy | RequestKind::AllPoolsBidirectionalCopy => self
                    .build_copy(
                        kind,
                        &requests.bidir_list,
                        &requests.bidir_list,
                        &mut transactions,
                        &mut active_agents,
                    )?,
                RequestKind::UnidirectionalCopy | RequestKind::AllPoolsUnidirectionalCopy => self
                    .build_copy(
                        kind,
                        &requests.src_list,
                        &requests.dst_list,
                        &mut transactions,
                        &mut active_agents,
                    )?,
            }
            tracing::info!(
                "built {} {} transactions",
                transactions.len() - before,
                kind
            );
        }

        Ok(TransferPlan {
            transactions,
            active_agents,
        })
    }

    /// Append one transaction per `(pool, agent)` pair in `list`. Fails
    /// without appending anything if any agent is never allowed to access
    /// its pool.
    pub fn build_read_or_write(
        &self,
        kind: RequestKind,
        list: &[usize],
        trans_list: &mut Vec<Transaction>,
    ) -> Result<(), BuildError> {
        if kind.is_copy() {
            return Err(BuildError::NotAKernel(kind));
        }
        if list.len() % 2 != 0 {
            return Err(BuildError::UnpairedList {
                kind,
                len: list.len(),
            });
        }

        let mut staged = Vec::with_capacity(list.len() / 2);
        for pair in list.chunks_exact(2) {
            let (pool_idx, exec_idx) = (pair[0], pair[1]);
            let pool = self.topology.pool(pool_idx)?;
            let agent = self.topology.agent(exec_idx)?;

            let access = self
                .access
                .pool_access(agent, pool)
                .map_err(|source| BuildError::AccessQuery {
                    agent: exec_idx,
                    pool: pool_idx,
                    source,
                })?;
            if access == PoolAccess::NeverAllowed {
                tracing::error!(
                    "agent {} ({:?}) is never allowed to access pool {} ({:?})",
                    exec_idx,
                    agent.handle,
                    pool_idx,
                    pool.handle
                );
                return Err(BuildError::PoolAccessDenied {
                    agent: exec_idx,
                    pool: pool_idx,
                });
            }

            staged.push(Transaction::new(
                kind,
                TransferOp::Kernel(KernelTransfer {
                    pool_index: pool_idx,
                    pool: pool.handle,
                    agent_index: exec_idx,
                    agent: agent.handle,
                    uses_accelerator: !agent.device_type.is_host(),
                    kernel: None,
                }),
            ));
        }

        trans_list.extend(staged);
        Ok(())
    }

    /// Append a copy transaction for every accepted `(src, dst)` pair of the
    /// cross product of `src_list` and `dst_list`, and mark the agents
    /// involved. On failure neither `trans_list` nor `active_agents` is
    /// modified.
    pub fn build_copy(
        &self,
        kind: RequestKind,
        src_list: &[usize],
        dst_list: &[usize],
        trans_list: &mut Vec<Transaction>,
        active_agents: &mut ActiveAgents,
    ) -> Result<(), BuildError> {
        if !kind.is_copy() {
            return Err(BuildError::NotACopy(kind));
        }
        let matrix = self.topology.access_matrix();

        let mut staged = Vec::new();
        let mut staged_agents = Vec::new();
        for &src_idx in src_list {
            let src_pool = self.topology.pool(src_idx)?;
            let src_dev_idx = src_pool.agent_index;
            let src_dev_type = self.topology.agent(src_dev_idx)?.device_type;

            for &dst_idx in dst_list {
                let dst_pool = self.topology.pool(dst_idx)?;
                let dst_dev_idx = dst_pool.agent_index;
                let dst_dev_type = self.topology.agent(dst_dev_idx)?.device_type;

                if src_dev_type.is_host() && dst_dev_type.is_host() {
                    tracing::debug!(
                        "{}: skipping host-to-host pair {} -> {}",
                        kind,
                        src_idx,
                        dst_idx
                    );
                    continue;
                }

                if kind.is_bidirectional() && src_dev_idx == dst_dev_idx {
                    tracing::debug!(
                        "{}: skipping pair {} -> {} on the same agent {}",
                        kind,
                        src_idx,
                        dst_idx,
                        src_dev_idx
                    );
                    continue;
                }

                if !matrix.path_exists(src_dev_idx, dst_dev_idx) {
                    if kind.is_all_pools() {
                        tracing::debug!(
                            "{}: skipping pair {} -> {} without a copy path",
                            kind,
                            src_idx,
                            dst_idx
                        );
                        continue;
                    }
                    tracing::error!(
                        "{}: no copy path from pool {} (agent {}) to pool {} (agent {})",
                        kind,
                        src_idx,
                        src_dev_idx,
                        dst_idx,
                        dst_dev_idx
                    );
                    return Err(BuildError::CopyAccessDenied {
                        src_pool: src_idx,
                        dst_pool: dst_idx,
                        src_agent: src_dev_idx,
                        dst_agent: dst_dev_idx,
                    });
                }

                staged_agents.push(src_dev_idx);
                staged_agents.push(dst_dev_idx);
                staged.push(Transaction::new(
                    kind,
                    TransferOp::Copy(CopyTransfer {
                        src_index: src_idx,
                        dst_index: dst_idx,
                        src_pool: src_pool.handle,
                        dst_pool: dst_pool.handle,
                        bidir: kind.is_bidirectional(),
                        uses_accelerator: !src_dev_type.is_host() || !dst_dev_type.is_host(),
                    }),
                ));
            }
        }

        for agent in staged_agents {
            active_agents.mark(agent);
        }
        trans_list.extend(staged);
        Ok(())
    }
}
