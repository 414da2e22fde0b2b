//! Maximal end-component decomposition.
//!
//! Repeatedly computes the SCCs of the graph induced by the remaining
//! choices, drops every choice that can leave its SCC and every state left
//! without choices, until nothing changes.

use std::collections::{BTreeMap, BTreeSet};

use log::trace;
use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::storage::{BitVector, SparseMatrix};

/// A set of states, each with the (global) rows that stay inside the set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MaximalEndComponent {
    states: BTreeMap<usize, BTreeSet<usize>>,
}

impl MaximalEndComponent {
    pub fn new() -> MaximalEndComponent {
        MaximalEndComponent::default()
    }

    pub fn add_state(&mut self, state: usize, choices: BTreeSet<usize>) {
        self.states.insert(state, choices);
    }

    pub fn size(&self) -> usize {
        self.states.len()
    }

    pub fn states(&self) -> impl Iterator<Item = usize> + '_ {
        self.states.keys().copied()
    }

    /// `(state, rows)` pairs in increasing state order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &BTreeSet<usize>)> + '_ {
        self.states.iter().map(|(s, c)| (*s, c))
    }

    pub fn contains_state(&self, state: usize) -> bool {
        self.states.contains_key(&state)
    }

    pub fn contains_choice(&self, state: usize, row: usize) -> bool {
        self.states.get(&state).map_or(false, |c| c.contains(&row))
    }

    pub fn choices_for_state(&self, state: usize) -> Option<&BTreeSet<usize>> {
        self.states.get(&state)
    }

    pub fn state_set(&self, number_of_states: usize) -> BitVector {
        BitVector::from_indices(number_of_states, self.states())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MaximalEndComponentDecomposition {
    mecs: Vec<MaximalEndComponent>,
}

impl MaximalEndComponentDecomposition {
    /// Decomposes the whole model.
    pub fn new(matrix: &SparseMatrix) -> MaximalEndComponentDecomposition {
        let all = BitVector::new(matrix.row_group_count(), true);
        MaximalEndComponentDecomposition::for_subsystem(matrix, &all, None)
    }

    /// Decomposes the sub-MDP on `subsystem`, only considering the rows in
    /// `choice_filter` if given. Rows leaving the subsystem never belong to a MEC.
    pub fn for_subsystem(
        matrix: &SparseMatrix,
        subsystem: &BitVector,
        choice_filter: Option<&BitVector>,
    ) -> MaximalEndComponentDecomposition {
        let n = matrix.row_group_count();
        let mut remaining = subsystem.clone();
        let mut enabled = BitVector::new(matrix.row_count(), false);
        for state in subsystem.iter() {
            for row in matrix.row_group(state) {
                let allowed = choice_filter.map_or(true, |f| f.get(row));
                if allowed && matrix.row(row).iter().all(|e| subsystem.get(e.column)) {
                    enabled.set(row, true);
                }
            }
        }

        let mut scc_of = vec![usize::MAX; n];
        let mut iterations = 0;
        loop {
            iterations += 1;
            // drop states without any enabled row
            for state in remaining.clone().iter() {
                if !matrix.row_group(state).any(|r| enabled.get(r)) {
                    remaining.set(state, false);
                }
            }

            let graph = Self::build_graph(matrix, &remaining, &enabled);
            for (i, scc) in kosaraju_scc(&graph).iter().enumerate() {
                for node in scc.iter() {
                    scc_of[graph[*node]] = i;
                }
            }

            let mut changed = false;
            for state in remaining.iter() {
                for row in matrix.row_group(state) {
                    if !enabled.get(row) {
                        continue;
                    }
                    let leaves = matrix
                        .row(row)
                        .iter()
                        .any(|e| !remaining.get(e.column) || scc_of[e.column] != scc_of[state]);
                    if leaves {
                        enabled.set(row, false);
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        trace!("MEC decomposition converged after {} iterations", iterations);

        let mut by_scc: BTreeMap<usize, MaximalEndComponent> = BTreeMap::new();
        for state in remaining.iter() {
            let choices: BTreeSet<usize> = matrix.row_group(state).filter(|r| enabled.get(*r)).collect();
            by_scc.entry(scc_of[state]).or_default().add_state(state, choices);
        }
        let mut mecs: Vec<MaximalEndComponent> = by_scc.into_values().collect();
        mecs.sort_by_key(|m| m.states().next());
        MaximalEndComponentDecomposition { mecs }
    }

    fn build_graph(matrix: &SparseMatrix, states: &BitVector, enabled: &BitVector) -> DiGraph<usize, ()> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let mut nodes: Vec<Option<NodeIndex>> = vec![None; matrix.row_group_count()];
        for state in states.iter() {
            nodes[state] = Some(graph.add_node(state));
        }
        for state in states.iter() {
            for row in matrix.row_group(state).filter(|r| enabled.get(*r)) {
                for entry in matrix.row(row) {
                    if let (Some(from), Some(to)) = (nodes[state], nodes[entry.column]) {
                        graph.update_edge(from, to, ());
                    }
                }
            }
        }
        graph
    }

    pub fn len(&self) -> usize {
        self.mecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mecs.is_empty()
    }

    pub fn get(&self, index: usize) -> &MaximalEndComponent {
        &self.mecs[index]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MaximalEndComponent> {
        self.mecs.iter()
    }

    /// Union of the states of all MECs.
    pub fn states(&self, number_of_states: usize) -> BitVector {
        let mut result = BitVector::new(number_of_states, false);
        for mec in self.mecs.iter() {
            for state in mec.states() {
                result.set(state, true);
            }
        }
        result
    }

    /// For every state the index of its MEC, if any.
    pub fn state_to_mec_index(&self, number_of_states: usize) -> Vec<Option<usize>> {
        let mut result = vec![None; number_of_states];
        for (i, mec) in self.mecs.iter().enumerate() {
            for state in mec.states() {
                result[state] = Some(i);
            }
        }
        result
    }
}

impl<'a> IntoIterator for &'a MaximalEndComponentDecomposition {
    type Item = &'a MaximalEndComponent;
    type IntoIter = std::slice::Iter<'a, MaximalEndComponent>;

    fn into_iter(self) -> Self::IntoIter {
        self.mecs.iter()
    }
}
