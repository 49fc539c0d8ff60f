//! Explicit coupling graph between engines.
//!
//! Engines are registered with a [`CouplingGraphBuilder`]. Every output table must
//! have exactly one producer; every input table is either linked to its producer
//! or recorded as exogenous. The resulting graph must be acyclic and gives the
//! order in which a host application should call each engine's `compute`.

use crate::discipline::{Discipline, TableDefinition};
use crate::errors::{RsiamError, RsiamResult};
use petgraph::algo::toposort;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Graph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Shared handle to an engine
pub type D = Arc<dyn Discipline>;

/// Engines as nodes, exchanged tables as edges
pub type DGraph = Graph<D, TableDefinition>;

#[derive(Default)]
pub struct CouplingGraphBuilder {
    disciplines: Vec<D>,
}

impl CouplingGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine with the builder.
    pub fn with_discipline(&mut self, discipline: D) -> &mut Self {
        self.disciplines.push(discipline);
        self
    }

    /// Builds the graph of the registered engines.
    ///
    /// Registration order does not matter: producers are collected before
    /// inputs are linked. Returns an error if a table has two producers, if a
    /// consumer declares a different unit than the producer, or if the
    /// dependencies form a cycle.
    pub fn build(&self) -> RsiamResult<CouplingGraph> {
        let mut graph: DGraph = Graph::new();
        let mut producers: HashMap<String, (NodeIndex, TableDefinition)> = HashMap::new();
        let mut exogenous: Vec<String> = vec![];

        let nodes: Vec<NodeIndex> = self
            .disciplines
            .iter()
            .map(|d| graph.add_node(d.clone()))
            .collect();

        for (discipline, node) in self.disciplines.iter().zip(&nodes) {
            for output in discipline.outputs() {
                if let Some((existing, _)) = producers.get(&output.name) {
                    return Err(RsiamError::DuplicateProducer {
                        variable: output.name.clone(),
                        first: graph[*existing].name(),
                        second: discipline.name(),
                    });
                }
                producers.insert(output.name.clone(), (*node, output));
            }
        }

        for (discipline, node) in self.disciplines.iter().zip(&nodes) {
            for input in discipline.inputs() {
                match producers.get(&input.name) {
                    Some((producer, definition)) => {
                        if definition.unit != input.unit {
                            return Err(RsiamError::UnitMismatch {
                                variable: input.name.clone(),
                                producer: definition.unit.clone(),
                                consumer: input.unit.clone(),
                            });
                        }
                        // An engine reading back its own output is not a coupling
                        if producer != node {
                            graph.add_edge(*producer, *node, input.clone());
                        }
                    }
                    None => {
                        if !exogenous.contains(&input.name) {
                            debug!(table = %input.name, consumer = %discipline.name(), "exogenous input");
                            exogenous.push(input.name.clone());
                        }
                    }
                }
            }
        }

        let order = toposort(&graph, None)
            .map_err(|cycle| RsiamError::CyclicCoupling(graph[cycle.node_id()].name()))?;

        Ok(CouplingGraph {
            graph,
            order,
            exogenous,
        })
    }
}

/// An acyclic graph of coupled engines
#[derive(Debug, Serialize, Deserialize)]
pub struct CouplingGraph {
    graph: DGraph,
    order: Vec<NodeIndex>,
    exogenous: Vec<String>,
}

impl CouplingGraph {
    /// Engine names in an order where every producer precedes its consumers
    pub fn evaluation_order(&self) -> Vec<String> {
        self.order.iter().map(|n| self.graph[*n].name()).collect()
    }

    /// Engines in evaluation order
    pub fn disciplines(&self) -> impl Iterator<Item = &D> {
        self.order.iter().map(|n| &self.graph[*n])
    }

    /// Tables that no registered engine produces
    pub fn exogenous(&self) -> &[String] {
        &self.exogenous
    }

    pub fn producer_of(&self, table: &str) -> Option<String> {
        self.graph
            .node_indices()
            .find(|n| self.graph[*n].output_names().iter().any(|t| t == table))
            .map(|n| self.graph[n].name())
    }

    /// Names of the engines that read `table` from its producer
    pub fn consumers_of(&self, table: &str) -> Vec<String> {
        self.couplings()
            .into_iter()
            .filter(|(_, _, t)| t == table)
            .map(|(_, consumer, _)| consumer)
            .collect()
    }

    /// Every (producer, consumer, table) link
    pub fn couplings(&self) -> Vec<(String, String, String)> {
        self.graph
            .edge_references()
            .map(|e| {
                (
                    self.graph[e.source()].name(),
                    self.graph[e.target()].name(),
                    e.weight().name.clone(),
                )
            })
            .collect()
    }

    pub fn graph(&self) -> &DGraph {
        &self.graph
    }
}
