//! Frame compilation: dependency analysis, culling, ordering and lifetimes.
//!
//! Writes of a resource in declaration order produce successive versions. A
//! reader consumes the latest version written by a pass declared before it;
//! a transient read before any write consumes the first version, produced
//! later. From that the compiler derives three kinds of edges:
//!
//! - read-after-write: producer of a version before each of its readers,
//! - write-after-write: writers of one resource in declaration order,
//! - write-after-read: readers of a version before the writer of the next.
//!
//! Culling walks read-after-write edges backward from the passes whose
//! effects escape the graph. Ordering is a topological sort of the surviving
//! passes, ties broken by declaration order.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashSet};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::device::RenderDevice;
use crate::error::{RenderGraphError, Result};
use crate::graph::RenderGraph;
use crate::handle::{PassHandle, ResourceHandle};
use crate::pass::{PassExecute, PassRecord, PassType, StoreOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DependencyKind {
    ReadAfterWrite,
    WriteAfterWrite,
    WriteAfterRead,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct DependencyEdge {
    from: usize,
    to: usize,
    resource: usize,
    kind: DependencyKind,
}

#[derive(Default)]
struct VersionState {
    last_writer: Option<usize>,
    readers: Vec<usize>,
    forward_readers: Vec<usize>,
}

impl<D: RenderDevice> RenderGraph<D> {
    /// Validates, culls and orders the declared passes and computes resource
    /// lifetimes. Any error leaves the graph uncompiled.
    pub fn compile(&mut self) -> Result<()> {
        let result = self.compile_passes();
        match &result {
            Ok(()) => {
                self.needs_recompile = false;
                log::debug!(
                    "Render graph compiled: {} live, {} culled, order [{}]",
                    self.execution_order.len(),
                    self.passes.len() - self.execution_order.len(),
                    self.execution_order
                        .iter()
                        .map(|handle| self.passes[handle.slot()].name())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            Err(error) => {
                self.needs_recompile = true;
                self.execution_order.clear();
                log::error!("Render graph compilation failed: {error}");
            }
        }
        result
    }

    fn compile_passes(&mut self) -> Result<()> {
        self.execution_order.clear();
        for pass in &mut self.passes {
            pass.reset_compile_state();
        }
        for record in &mut self.resources {
            record.reset_lifetime();
        }

        let edges = self.build_dependency_edges();
        let live = self.compute_live_passes(&edges);
        for (pass, &alive) in self.passes.iter_mut().zip(&live) {
            pass.culled = !alive;
        }

        for (index, pass) in self.passes.iter().enumerate() {
            if live[index] {
                self.validate_resources(pass)?;
                validate_callback(pass)?;
            }
        }

        let order = self.sort_live_passes(&edges, &live)?;
        for (position, &index) in order.iter().enumerate() {
            self.passes[index].execution_order = Some(position as u32);
        }
        for edge in &edges {
            if live[edge.from] && live[edge.to] {
                let dependencies = &mut self.passes[edge.to].dependencies;
                let dependency = PassHandle::new(edge.from as u32);
                if !dependencies.contains(&dependency) {
                    dependencies.push(dependency);
                }
            }
        }
        for pass in &mut self.passes {
            pass.dependencies.sort();
        }
        self.execution_order = order
            .iter()
            .map(|&index| PassHandle::new(index as u32))
            .collect();

        self.compute_resource_lifetimes();
        self.compute_store_ops();
        Ok(())
    }

    fn touched_resources(&self, pass: &PassRecord<D>) -> Vec<usize> {
        let mut touched: Vec<usize> = Vec::new();
        for access in pass.reads().iter().chain(pass.writes()) {
            if let Some(slot) = self.resource_slot(access.handle)
                && !touched.contains(&slot)
            {
                touched.push(slot);
            }
        }
        touched
    }

    pub(crate) fn build_dependency_edges(&self) -> Vec<DependencyEdge> {
        let mut states: Vec<VersionState> = Vec::new();
        states.resize_with(self.resources.len(), VersionState::default);
        let mut edges = Vec::new();

        for (index, pass) in self.passes.iter().enumerate() {
            for resource in self.touched_resources(pass) {
                let handle = self.handle_for_slot(resource);
                let transient = self.resources[resource].is_transient();
                let reads = pass.reads_resource(handle) || pass.loads_resource(handle);
                let writes = pass.writes_resource(handle);
                let state = &mut states[resource];

                if reads {
                    match state.last_writer {
                        Some(writer) => {
                            if writer != index {
                                edges.push(DependencyEdge {
                                    from: writer,
                                    to: index,
                                    resource,
                                    kind: DependencyKind::ReadAfterWrite,
                                });
                            }
                            state.readers.push(index);
                        }
                        None if transient => state.forward_readers.push(index),
                        None => state.readers.push(index),
                    }
                }

                if writes {
                    if let Some(writer) = state.last_writer
                        && writer != index
                    {
                        edges.push(DependencyEdge {
                            from: writer,
                            to: index,
                            resource,
                            kind: DependencyKind::WriteAfterWrite,
                        });
                    }
                    for &reader in &state.readers {
                        if reader != index {
                            edges.push(DependencyEdge {
                                from: reader,
                                to: index,
                                resource,
                                kind: DependencyKind::WriteAfterRead,
                            });
                        }
                    }
                    state.readers.clear();
                    if state.last_writer.is_none() {
                        for reader in std::mem::take(&mut state.forward_readers) {
                            if reader != index {
                                edges.push(DependencyEdge {
                                    from: index,
                                    to: reader,
                                    resource,
                                    kind: DependencyKind::ReadAfterWrite,
                                });
                                state.readers.push(reader);
                            }
                        }
                    }
                    state.last_writer = Some(index);
                }
            }
        }

        for edge in &edges {
            log::trace!(
                "{:?}: '{}' -> '{}' on '{}'",
                edge.kind,
                self.passes[edge.from].name(),
                self.passes[edge.to].name(),
                self.resources[edge.resource].name()
            );
        }
        for (resource, state) in states.iter().enumerate() {
            if state.last_writer.is_none() && !state.forward_readers.is_empty() {
                log::warn!(
                    "Transient '{}' is read but never written",
                    self.resources[resource].name()
                );
            }
        }
        edges
    }

    fn handle_for_slot(&self, slot: usize) -> ResourceHandle {
        ResourceHandle::new(slot as u32, self.resources[slot].generation())
    }

    /// Backward fixed point over read-after-write edges from the passes whose
    /// effects escape the graph: `NEVER_CULL` passes, passes rendering into an
    /// attachment and passes writing an imported resource. Storage-only writes
    /// keep a pass alive only while a live pass reads them.
    fn compute_live_passes(&self, edges: &[DependencyEdge]) -> Vec<bool> {
        if !self.config.cull_passes {
            return vec![true; self.passes.len()];
        }

        let mut producers: Vec<Vec<usize>> = vec![Vec::new(); self.passes.len()];
        for edge in edges {
            if edge.kind == DependencyKind::ReadAfterWrite {
                producers[edge.to].push(edge.from);
            }
        }

        let mut live = vec![false; self.passes.len()];
        let mut worklist: Vec<usize> = self
            .passes
            .iter()
            .enumerate()
            .filter(|(_, pass)| {
                pass.never_cull() || pass.writes_attachments() || self.writes_imported(pass)
            })
            .map(|(index, _)| index)
            .collect();

        while let Some(index) = worklist.pop() {
            if live[index] {
                continue;
            }
            live[index] = true;
            worklist.extend(producers[index].iter().filter(|&&producer| !live[producer]));
        }

        for (pass, &alive) in self.passes.iter().zip(&live) {
            if !alive {
                log::debug!("Culling pass '{}'", pass.name());
            }
        }
        live
    }

    fn writes_imported(&self, pass: &PassRecord<D>) -> bool {
        pass.writes().iter().any(|access| {
            self.resource(access.handle)
                .is_some_and(|record| record.is_imported())
        })
    }

    fn validate_resources(&self, pass: &PassRecord<D>) -> Result<()> {
        for access in pass.reads().iter().chain(pass.writes()) {
            let record =
                self.resource(access.handle)
                    .ok_or_else(|| RenderGraphError::StaleResourceHandle {
                        pass: pass.name().to_string(),
                        handle: access.handle,
                    })?;
            if record.kind() != access.kind {
                return Err(RenderGraphError::ResourceKindMismatch {
                    pass: pass.name().to_string(),
                    resource: record.name().to_string(),
                    expected: access.kind.to_string(),
                    actual: record.kind().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Kahn's algorithm over live passes, smallest declaration index first.
    fn sort_live_passes(&self, edges: &[DependencyEdge], live: &[bool]) -> Result<Vec<usize>> {
        let mut graph: DiGraph<usize, DependencyKind> = DiGraph::new();
        let mut nodes: Vec<Option<NodeIndex>> = vec![None; self.passes.len()];
        for (index, &alive) in live.iter().enumerate() {
            if alive {
                nodes[index] = Some(graph.add_node(index));
            }
        }
        for edge in edges {
            if let (Some(from), Some(to)) = (nodes[edge.from], nodes[edge.to])
                && !graph.contains_edge(from, to)
            {
                graph.add_edge(from, to, edge.kind);
            }
        }

        let mut in_degree: Vec<usize> = graph
            .node_indices()
            .map(|node| graph.neighbors_directed(node, Direction::Incoming).count())
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> = graph
            .node_indices()
            .filter(|node| in_degree[node.index()] == 0)
            .map(|node| Reverse(graph[node]))
            .collect();

        let mut order = Vec::with_capacity(graph.node_count());
        while let Some(Reverse(index)) = ready.pop() {
            order.push(index);
            let Some(node) = nodes[index] else {
                continue;
            };
            for next in graph.neighbors_directed(node, Direction::Outgoing) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    ready.push(Reverse(graph[next]));
                }
            }
        }

        if order.len() < graph.node_count() {
            let passes = petgraph::algo::tarjan_scc(&graph)
                .into_iter()
                .filter(|component| component.len() > 1)
                .flatten()
                .map(|node| graph[node])
                .collect::<BTreeSet<_>>()
                .into_iter()
                .map(|index| self.passes[index].name().to_string())
                .collect();
            return Err(RenderGraphError::CyclicDependency { passes });
        }

        Ok(order)
    }

    fn compute_resource_lifetimes(&mut self) {
        let order = self.execution_order.clone();
        for (position, handle) in order.iter().enumerate() {
            let position = position as u32;
            let pass = &self.passes[handle.slot()];
            let mut counted: HashSet<usize> = HashSet::new();

            for access in pass.writes() {
                let Some(slot) = self.resource_slot(access.handle) else {
                    continue;
                };
                let record = &mut self.resources[slot];
                if record.first_writer.is_none() {
                    record.first_writer = Some(*handle);
                }
                record.first_use.get_or_insert(position);
                record.last_use = Some(position);
                if counted.insert(slot) {
                    record.ref_count += 1;
                }
            }

            for access in pass.reads() {
                let Some(slot) = self.resource_slot(access.handle) else {
                    continue;
                };
                let record = &mut self.resources[slot];
                record.last_reader = Some(*handle);
                record.first_use.get_or_insert(position);
                record.last_use = Some(position);
                if counted.insert(slot) {
                    record.ref_count += 1;
                }
            }
        }
    }

    /// Downgrades stores on transient attachments that no later live pass reads.
    fn compute_store_ops(&mut self) {
        if !self.config.elide_stores {
            return;
        }

        let mut last_read: Vec<Option<u32>> = vec![None; self.resources.len()];
        for (position, handle) in self.execution_order.iter().enumerate() {
            let pass = &self.passes[handle.slot()];
            let read = pass.reads().iter().map(|access| access.handle);
            for resource in read.chain(pass.loaded_resources()) {
                if let Some(slot) = self.resource_slot(resource) {
                    last_read[slot] = Some(position as u32);
                }
            }
        }

        let order = self.execution_order.clone();
        for (position, handle) in order.iter().enumerate() {
            let position = position as u32;
            let elide = |resource: ResourceHandle, store_op: StoreOp| -> StoreOp {
                let Some(slot) = self.resource_slot(resource) else {
                    return store_op;
                };
                let read_later = last_read[slot].is_some_and(|last| last > position);
                if store_op == StoreOp::Store && self.resources[slot].is_transient() && !read_later
                {
                    log::trace!(
                        "Discarding store of '{}' in '{}'",
                        self.resources[slot].name(),
                        self.passes[handle.slot()].name()
                    );
                    StoreOp::Discard
                } else {
                    store_op
                }
            };

            let pass = &self.passes[handle.slot()];
            let color_store_ops: Vec<StoreOp> = pass
                .color_attachments()
                .iter()
                .map(|attachment| {
                    if attachment.is_present() {
                        elide(attachment.handle, attachment.store_op)
                    } else {
                        attachment.store_op
                    }
                })
                .collect();
            let depth_store_ops = pass.depth_stencil_attachment().map(|depth| {
                if depth.read_only {
                    (depth.depth_store_op, depth.stencil_store_op)
                } else {
                    (
                        elide(depth.handle, depth.depth_store_op),
                        elide(depth.handle, depth.stencil_store_op),
                    )
                }
            });

            let pass = &mut self.passes[handle.slot()];
            pass.color_store_ops = color_store_ops;
            pass.depth_store_ops = depth_store_ops;
        }
    }
}

fn validate_callback<D: RenderDevice>(pass: &PassRecord<D>) -> Result<()> {
    let mismatch = |reason: &str| RenderGraphError::CallbackTypeMismatch {
        pass: pass.name().to_string(),
        reason: reason.to_string(),
    };

    if pass.callback_conflict {
        return Err(mismatch(
            "both a graphics and a compute callback were installed",
        ));
    }

    match (&pass.execute, pass.pass_type()) {
        (PassExecute::None, _) => Err(RenderGraphError::MissingCallback {
            pass: pass.name().to_string(),
        }),
        (PassExecute::Graphics(_), PassType::Graphics) => Ok(()),
        (PassExecute::Compute(_), PassType::Graphics) => {
            Err(mismatch("compute callback on a graphics pass"))
        }
        (PassExecute::Graphics(_), pass_type) => Err(mismatch(&format!(
            "graphics callback on a {pass_type} pass"
        ))),
        (PassExecute::Compute(_), pass_type) if pass.has_attachments() => Err(mismatch(
            &format!("{pass_type} pass declares render attachments"),
        )),
        (PassExecute::Compute(_), _) => Ok(()),
    }
}
