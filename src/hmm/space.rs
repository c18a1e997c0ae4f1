//! Enumeration of the legal composite states for an n-way alignment HMM.
//!
//! A composite state is legal when its present nodes are mutually
//! connected on the subset topology, every branch with a present endpoint
//! carries the sub-state forced by that presence pattern, and every silent
//! branch (no endpoint present) is marked not-present while carrying one of
//! the three pairwise states as its memory. The enumeration order is fixed:
//! presence masks by descending population count then ascending value,
//! carried sub-states in lexicographic branch order. Path encoding indexes
//! into this list, so the order must never change between runs.

use std::collections::HashMap;

use itertools::Itertools;

use crate::hmm::state::{CompositeState, SubState, SubsetShape};

#[derive(Clone, Debug)]
pub struct StateSpace {
    shape: SubsetShape,
    states: Vec<u32>,
    index: HashMap<u32, usize>,
}

impl StateSpace {
    pub fn new(shape: SubsetShape) -> Self {
        let states = construct_states(&shape);
        let index = states
            .iter()
            .enumerate()
            .map(|(i, &code)| (code, i))
            .collect();
        Self {
            shape,
            states,
            index,
        }
    }

    pub fn pairwise() -> Self {
        Self::new(SubsetShape::pairwise())
    }

    pub fn three_way() -> Self {
        Self::new(SubsetShape::three_way())
    }

    pub fn five_way() -> Self {
        Self::new(SubsetShape::five_way())
    }

    pub fn shape(&self) -> &SubsetShape {
        &self.shape
    }

    /// Number of legal non-end states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Index of the implicit End state, one past the legal states.
    pub fn end_state(&self) -> usize {
        self.states.len()
    }

    /// The packed codes of the legal states, in canonical order.
    pub fn states_list(&self) -> &[u32] {
        &self.states
    }

    pub fn state(&self, index: usize) -> CompositeState {
        self.shape.state(self.states[index])
    }

    /// Canonical index of a packed state code; `None` when the bit pattern
    /// is not a legal state for this subset topology.
    pub fn findstate(&self, code: u32) -> Option<usize> {
        self.index.get(&code).copied()
    }

    /// Does state `index` emit a character for local node `i`?
    pub fn emits(&self, index: usize, i: usize) -> bool {
        self.state(index).is_present(i)
    }

    /// Per-state node presence masks, in list order.
    pub fn state_emit(&self) -> Vec<u32> {
        self.states
            .iter()
            .map(|&code| self.shape.state(code).presence_mask())
            .collect()
    }
}

/// Build the ordered list of legal composite state codes for a shape.
fn construct_states(shape: &SubsetShape) -> Vec<u32> {
    let n = shape.n_nodes();
    let nb = shape.n_branches();

    let mut masks: Vec<u32> = (1..(1u32 << n)).filter(|&m| shape.is_connected(m)).collect();
    masks.sort_by_key(|&m| (std::cmp::Reverse(m.count_ones()), m));

    let mut states = Vec::new();
    for mask in masks {
        let present = |i: usize| mask & (1 << i) != 0;

        let mut forced: Vec<Option<SubState>> = Vec::with_capacity(nb);
        let mut not_present = 0u32;
        for b in 0..nb {
            let (first, second) = shape.branch(b);
            forced.push(match (present(first), present(second)) {
                (true, true) => Some(SubState::Match),
                (true, false) => Some(SubState::Gap1),
                (false, true) => Some(SubState::Gap2),
                (false, false) => {
                    not_present |= 1 << b;
                    None
                }
            });
        }

        let silent: Vec<usize> = (0..nb).filter(|&b| forced[b].is_none()).collect();
        // A mask with no silent branches still yields its one forced state.
        for carried in silent
            .iter()
            .map(|_| SubState::ALL.into_iter())
            .multi_cartesian_product()
            .pad_using(1, |_| Vec::new())
        {
            let mut substates = Vec::with_capacity(nb);
            let mut next_carried = carried.iter();
            for b in 0..nb {
                match forced[b] {
                    Some(s) => substates.push(s),
                    None => substates.push(*next_carried.next().unwrap()),
                }
            }
            states.push(shape.pack(mask, &substates, not_present).code());
        }
    }
    states
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmm::state::PairState;

    #[test]
    fn pairwise_states_match_pair_hmm_indices() {
        let space = StateSpace::pairwise();
        assert_eq!(space.len(), 3);
        assert_eq!(space.end_state(), PairState::End.index());
        // Match, Gap1, Gap2 in PairHMM order.
        assert_eq!(space.state(0).presence_mask(), 0b11);
        assert_eq!(space.state(1).presence_mask(), 0b01);
        assert_eq!(space.state(2).presence_mask(), 0b10);
        assert_eq!(space.state(0).substate(0), SubState::Match);
        assert_eq!(space.state(1).substate(0), SubState::Gap1);
        assert_eq!(space.state(2).substate(0), SubState::Gap2);
        // No pairwise state can be silent on its only branch.
        for i in 0..space.len() {
            assert_eq!(space.state(i).not_present_mask(), 0);
        }
    }

    #[test]
    fn three_way_has_thirty_five_states() {
        let space = StateSpace::three_way();
        // 1 all-present + 3 two-neighbor + 3 one-neighbor + 1 center-only
        // + 3 * 9 lone-neighbor states with carried memory.
        assert_eq!(space.len(), 35);
        assert_eq!(space.end_state(), 35);

        let all_present = space.state(0);
        assert_eq!(all_present.presence_mask(), 0b1111);
        for b in 0..3 {
            assert_eq!(all_present.substate(b), SubState::Match);
        }

        let carried: Vec<usize> = (0..space.len())
            .filter(|&i| space.state(i).not_present_mask() != 0)
            .collect();
        assert_eq!(carried.len(), 27);
        for &i in &carried {
            let s = space.state(i);
            // Lone neighbor: exactly one present node, never the center.
            assert_eq!(s.presence_mask().count_ones(), 1);
            assert!(!s.is_present(0));
            assert_eq!(s.not_present_mask().count_ones(), 2);
        }
    }

    #[test]
    fn five_way_count_is_stable() {
        let space = StateSpace::five_way();
        // 16 with both hubs + 2 * 4 * 9 single-hub + 4 * 81 lone-leaf.
        assert_eq!(space.len(), 412);
        assert_eq!(construct_states(space.shape()), space.states_list());
    }

    #[test]
    fn construction_is_deterministic() {
        let a = StateSpace::three_way();
        let b = StateSpace::three_way();
        assert_eq!(a.states_list(), b.states_list());
    }

    #[test]
    fn findstate_inverts_the_list() {
        let space = StateSpace::five_way();
        for (i, &code) in space.states_list().iter().enumerate() {
            assert_eq!(space.findstate(code), Some(i));
        }
        // A disconnected presence pattern is not a state.
        let shape = space.shape();
        let bogus = shape.pack(0b000101, &[SubState::Match; 5], 0);
        assert_eq!(space.findstate(bogus.code()), None);
    }

    #[test]
    fn emission_masks_follow_presence() {
        let space = StateSpace::three_way();
        let emit = space.state_emit();
        assert_eq!(emit.len(), space.len());
        for (i, &mask) in emit.iter().enumerate() {
            for node in 0..4 {
                assert_eq!(space.emits(i, node), mask & (1 << node) != 0);
            }
        }
    }
}
