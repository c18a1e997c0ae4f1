//! Bidirectional mapping between explicit alignments and HMM paths.
//!
//! A path is the ordered list of composite-state indices (into the state
//! space's legal-state list) that fully determines the sub-alignment of a
//! node subset; the End state is implicit and never stored. `construct`
//! renders a path back into alignment columns, `get_path` recovers the
//! path from the columns. The two are exact inverses on carry-consistent
//! paths: silent branches keep the last emitted sub-state, starting from
//! Match.

use smallvec::SmallVec;

use crate::core::alignment::Alignment;
use crate::encoding::Cell;
use crate::errors::{PhylignError, Result};
use crate::hmm::space::StateSpace;
use crate::hmm::state::SubState;

pub type Path = Vec<usize>;

/// Is `column` of `old` inside the subset's scope, i.e. does any subset
/// row hold a character there?
fn in_scope(old: &Alignment, column: usize, nodes: &[usize]) -> bool {
    nodes.iter().any(|&n| old.character(column, n))
}

/// Construct a new alignment from a path through the subset HMM.
///
/// One output column is created per path step; subset node `i` consumes
/// the next symbol of `seqs[i]` whenever its state emits there. Absent
/// nodes get a gap when some incident subset branch still has a column
/// here, and the not-present marker when the state carries every incident
/// branch silently. Columns of `old` outside the subset's scope are copied
/// unchanged; the path block replaces the in-scope span. Rows outside the
/// subset carry the not-present marker in path columns, so `old` must not
/// align foreign characters into the realigned region.
pub fn construct(
    old: &Alignment,
    path: &[usize],
    nodes: &[usize],
    seqs: &[Vec<u8>],
    space: &StateSpace,
) -> Result<Alignment> {
    let shape = space.shape();
    assert_eq!(nodes.len(), shape.n_nodes());
    assert_eq!(seqs.len(), nodes.len());

    let incident: Vec<SmallVec<[usize; 3]>> =
        (0..nodes.len()).map(|i| shape.incident(i)).collect();
    let mut consumed = vec![0usize; nodes.len()];
    let n_rows = old.n_rows();

    let mut path_columns: Vec<Vec<Cell>> = Vec::with_capacity(path.len());
    for (step, &index) in path.iter().enumerate() {
        if index >= space.end_state() {
            return Err(PhylignError::MalformedPath(format!(
                "step {step} references state {index}, but only {} states exist",
                space.end_state()
            )));
        }
        let state = space.state(index);
        let mut column = vec![Cell::Unknown; n_rows];
        for (i, &node) in nodes.iter().enumerate() {
            column[node] = if state.is_present(i) {
                let symbol = seqs[i].get(consumed[i]).copied().ok_or_else(|| {
                    PhylignError::MalformedPath(format!(
                        "sequence {i} exhausted at step {step}: the path emits more \
                         than {} symbols",
                        seqs[i].len()
                    ))
                })?;
                consumed[i] += 1;
                Cell::Letter(symbol)
            } else if incident[i].iter().all(|&b| state.branch_not_present(b)) {
                Cell::Unknown
            } else {
                Cell::Gap
            };
        }
        path_columns.push(column);
    }

    for (i, seq) in seqs.iter().enumerate() {
        if consumed[i] != seq.len() {
            return Err(PhylignError::MalformedPath(format!(
                "path consumed {} of {} symbols of sequence {i}",
                consumed[i],
                seq.len()
            )));
        }
    }

    // Splice: out-of-scope columns survive in order, the path block lands
    // where the realigned region started.
    let mut columns: Vec<Vec<Cell>> = Vec::with_capacity(old.len() + path_columns.len());
    let mut spliced = false;
    for c in 0..old.len() {
        if in_scope(old, c, nodes) {
            debug_assert!(
                (0..n_rows)
                    .filter(|r| !nodes.contains(r))
                    .all(|r| !old.character(c, r)),
                "column {c} aligns foreign characters into the realigned region"
            );
            if !spliced {
                columns.append(&mut path_columns);
                spliced = true;
            }
        } else {
            columns.push((0..n_rows).map(|r| old.cell(c, r)).collect());
        }
    }
    if !spliced {
        columns.append(&mut path_columns);
    }

    let mut result = Alignment::new(n_rows);
    result.changelength(columns.len());
    for (c, column) in columns.iter().enumerate() {
        for (r, &cell) in column.iter().enumerate() {
            result.set(c, r, cell);
        }
    }
    Ok(result)
}

/// Recover the path that `alignment`, restricted to `nodes`, determines
/// through the subset HMM.
///
/// Walks every column: columns with no subset character at all are skipped
/// when they are plain gaps (out of scope) and rejected when they claim the
/// not-present marker — a column structurally outside every sub-alignment
/// has no legal state. Presence patterns with no legal state (disconnected
/// characters) are rejected with the offending column.
pub fn get_path(alignment: &Alignment, nodes: &[usize], space: &StateSpace) -> Result<Path> {
    let shape = space.shape();
    assert_eq!(nodes.len(), shape.n_nodes());

    let mut carried: SmallVec<[SubState; 5]> =
        SmallVec::from_elem(SubState::Match, shape.n_branches());
    let mut path = Vec::new();

    for c in 0..alignment.len() {
        let cells: SmallVec<[Cell; 6]> =
            nodes.iter().map(|&n| alignment.cell(c, n)).collect();

        let mut presence = 0u32;
        for (i, cell) in cells.iter().enumerate() {
            if cell.is_letter() {
                presence |= 1 << i;
            }
        }

        if presence == 0 {
            if cells.iter().all(Cell::is_gap) {
                continue;
            }
            return Err(PhylignError::MalformedAlignment(format!(
                "column {c} is marked not-present for the whole node subset"
            )));
        }

        let mut substates: SmallVec<[SubState; 5]> = SmallVec::new();
        let mut not_present = 0u32;
        for b in 0..shape.n_branches() {
            let (first, second) = shape.branch(b);
            let substate = match (presence & (1 << first) != 0, presence & (1 << second) != 0) {
                (true, true) => SubState::Match,
                (true, false) => SubState::Gap1,
                (false, true) => SubState::Gap2,
                (false, false) => {
                    not_present |= 1 << b;
                    carried[b]
                }
            };
            substates.push(substate);
        }

        let code = shape.pack(presence, &substates, not_present).code();
        let index = space.findstate(code).ok_or_else(|| {
            PhylignError::MalformedAlignment(format!(
                "column {c} has no legal state: presence pattern {presence:#b} \
                 is not connected on the node subset"
            ))
        })?;

        for b in 0..shape.n_branches() {
            if not_present & (1 << b) == 0 {
                carried[b] = substates[b];
            }
        }
        path.push(index);
    }

    Ok(path)
}

/// Path of the three-way HMM around internal node `n0` with neighbors
/// `n1`, `n2`, `n3`.
pub fn get_path_3way(
    alignment: &Alignment,
    n0: usize,
    n1: usize,
    n2: usize,
    n3: usize,
    space: &StateSpace,
) -> Result<Path> {
    get_path(alignment, &[n0, n1, n2, n3], space)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmm::state::PairState;

    fn cells(pattern: &str) -> Vec<Cell> {
        pattern.chars()
            .map(|ch| match ch {
                '-' => Cell::Gap,
                '?' => Cell::Unknown,
                d => Cell::Letter(d.to_digit(10).unwrap() as u8),
            })
            .collect()
    }

    #[test]
    fn pairwise_end_to_end_scenario() {
        // Sequences AC and ACG with path [Match, Match, Gap2] decode to
        // the columns (A,A), (C,C), (-,G); re-encoding returns the path.
        let space = StateSpace::pairwise();
        let old = Alignment::new(2);
        let seqs = vec![vec![0u8, 1], vec![0u8, 1, 2]];
        let path = vec![
            PairState::Match.index(),
            PairState::Match.index(),
            PairState::Gap2.index(),
        ];

        let a = construct(&old, &path, &[0, 1], &seqs, &space).unwrap();
        assert_eq!(a.len(), 3);
        assert_eq!(a.cell(0, 0), Cell::Letter(0));
        assert_eq!(a.cell(0, 1), Cell::Letter(0));
        assert_eq!(a.cell(1, 0), Cell::Letter(1));
        assert_eq!(a.cell(1, 1), Cell::Letter(1));
        assert_eq!(a.cell(2, 0), Cell::Gap);
        assert_eq!(a.cell(2, 1), Cell::Letter(2));

        assert_eq!(get_path(&a, &[0, 1], &space).unwrap(), path);
    }

    #[test]
    fn pairwise_round_trip_over_all_paths() {
        // The pairwise HMM has no silent branch, so every state sequence
        // round-trips exactly.
        let space = StateSpace::pairwise();
        let old = Alignment::new(2);
        for path in [
            vec![0, 0],
            vec![1, 2],
            vec![2, 1],
            vec![0, 1, 2, 0],
            vec![2, 2, 1, 1, 0],
        ] {
            let seq1_len = path.iter().filter(|&&s| s == 0 || s == 1).count();
            let seq2_len = path.iter().filter(|&&s| s == 0 || s == 2).count();
            let seqs = vec![
                (0..seq1_len as u8).collect::<Vec<u8>>(),
                (0..seq2_len as u8).collect::<Vec<u8>>(),
            ];
            let a = construct(&old, &path, &[0, 1], &seqs, &space).unwrap();
            assert_eq!(get_path(&a, &[0, 1], &space).unwrap(), path);
        }
    }

    #[test]
    fn construct_rejects_inconsistent_sequences() {
        let space = StateSpace::pairwise();
        let old = Alignment::new(2);
        // Path wants 2 symbols of sequence 0 but only 1 exists.
        let err = construct(&old, &[0, 0], &[0, 1], &[vec![0], vec![0, 1]], &space);
        assert!(matches!(err, Err(PhylignError::MalformedPath(_))));
        // Leftover symbols are just as inconsistent.
        let err = construct(&old, &[0], &[0, 1], &[vec![0, 1], vec![0]], &space);
        assert!(matches!(err, Err(PhylignError::MalformedPath(_))));
    }

    #[test]
    fn construct_rejects_out_of_range_states() {
        let space = StateSpace::pairwise();
        let old = Alignment::new(2);
        let err = construct(&old, &[3], &[0, 1], &[vec![], vec![]], &space);
        assert!(matches!(err, Err(PhylignError::MalformedPath(_))));
    }

    #[test]
    fn construct_splices_around_foreign_columns() {
        // Row 2 is outside the subset; its columns survive around the
        // realigned block.
        let space = StateSpace::pairwise();
        let old = Alignment::from_rows(&[
            cells("-0-"),
            cells("-1-"),
            cells("2-3"),
        ])
        .unwrap();
        let a = construct(&old, &[0, 2], &[0, 1], &[vec![5], vec![6, 7]], &space).unwrap();
        assert_eq!(a.len(), 4);
        // Leading foreign column, two path columns, trailing foreign column.
        assert_eq!(a.cell(0, 2), Cell::Letter(2));
        assert_eq!(a.cell(1, 0), Cell::Letter(5));
        assert_eq!(a.cell(1, 1), Cell::Letter(6));
        assert_eq!(a.cell(2, 0), Cell::Gap);
        assert_eq!(a.cell(2, 1), Cell::Letter(7));
        assert_eq!(a.cell(3, 2), Cell::Letter(3));
        // Path columns mark the foreign row as not applicable.
        assert_eq!(a.cell(1, 2), Cell::Unknown);
    }

    #[test]
    fn three_way_round_trip_with_carried_memory() {
        let space = StateSpace::three_way();
        let old = Alignment::new(4);
        // All-present, lone neighbor 1 (carrying Match on branches 1, 2),
        // all-present again: a carry-consistent path.
        let all = space
            .findstate(
                space
                    .shape()
                    .pack(0b1111, &[SubState::Match; 3], 0)
                    .code(),
            )
            .unwrap();
        let lone = space
            .findstate(
                space
                    .shape()
                    .pack(
                        0b0010,
                        &[SubState::Gap1, SubState::Match, SubState::Match],
                        0b110,
                    )
                    .code(),
            )
            .unwrap();
        let path = vec![all, lone, all];
        let seqs = vec![vec![0u8, 1], vec![0u8, 1, 2], vec![0u8, 1], vec![0u8, 1]];
        let a = construct(&old, &path, &[0, 1, 2, 3], &seqs, &space).unwrap();
        assert_eq!(a.len(), 3);
        // The lone-neighbor column gaps the center and marks the silent
        // neighbors as not applicable.
        assert_eq!(a.cell(1, 0), Cell::Gap);
        assert_eq!(a.cell(1, 1), Cell::Letter(1));
        assert_eq!(a.cell(1, 2), Cell::Unknown);
        assert_eq!(a.cell(1, 3), Cell::Unknown);
        assert_eq!(get_path_3way(&a, 0, 1, 2, 3, &space).unwrap(), path);
    }

    #[test]
    fn get_path_skips_out_of_scope_gap_columns() {
        let space = StateSpace::pairwise();
        let a = Alignment::from_rows(&[cells("0--1"), cells("2--3")]).unwrap();
        let path = get_path(&a, &[0, 1], &space).unwrap();
        assert_eq!(path, vec![0, 0]);
    }

    #[test]
    fn get_path_rejects_all_absent_columns() {
        let space = StateSpace::pairwise();
        let a = Alignment::from_rows(&[cells("0?1"), cells("2?3")]).unwrap();
        let err = get_path(&a, &[0, 1], &space);
        assert!(matches!(err, Err(PhylignError::MalformedAlignment(_))));
        // A half-marked column is no better.
        let b = Alignment::from_rows(&[cells("0-1"), cells("2?3")]).unwrap();
        assert!(get_path(&b, &[0, 1], &space).is_err());
    }

    #[test]
    fn get_path_rejects_disconnected_presence() {
        let space = StateSpace::three_way();
        // Neighbors 1 and 2 present while the center is gapped: their
        // characters cannot be connected through the tree.
        let a = Alignment::from_rows(&[
            cells("-"),
            cells("0"),
            cells("1"),
            cells("-"),
        ])
        .unwrap();
        let err = get_path(&a, &[0, 1, 2, 3], &space);
        assert!(matches!(err, Err(PhylignError::MalformedAlignment(_))));
    }

    #[test]
    fn projection_of_construct_matches_path_columns() {
        use crate::hmm::project::{getorder, project};
        let space = StateSpace::pairwise();
        let old = Alignment::from_rows(&[
            cells("--"),
            cells("--"),
            cells("45"),
        ])
        .unwrap();
        let path = vec![0, 2];
        let a = construct(&old, &path, &[0, 1], &[vec![7], vec![8, 9]], &space).unwrap();
        let order = getorder(&a, &[0, 1]);
        assert_eq!(order.len(), 2);
        let p = project(&a, &[0, 1]);
        assert_eq!(p.cell(0, 0), Cell::Letter(7));
        assert_eq!(p.cell(0, 1), Cell::Letter(8));
        assert_eq!(p.cell(1, 0), Cell::Gap);
        assert_eq!(p.cell(1, 1), Cell::Letter(9));
        // Re-encoding the projection gives the same path.
        assert_eq!(get_path(&p, &[0, 1], &space).unwrap(), path);
    }
}
