//! Collapsing end components of the maybe states into single row groups.

use log::debug;

use crate::storage::{BitVector, MaximalEndComponentDecomposition, SparseMatrix, SparseMatrixBuilder};

/// Maps maybe states to the row groups of the reduced system. States outside
/// any EC come first (in state order), followed by one row group per EC.
#[derive(Debug, Clone)]
pub struct SparseMdpEndComponentInformation {
    eliminated_end_components: bool,
    number_of_maybe_states_in_ec: usize,
    number_of_maybe_states_not_in_ec: usize,
    number_of_ec: usize,
    // original state -> number of maybe states before it
    maybe_states_before: Vec<usize>,
    // compact maybe index -> EC index
    maybe_state_to_ec: Vec<Option<usize>>,
    // compact maybe index -> number of non-EC maybe states before it
    maybe_states_not_in_ec_before: Vec<usize>,
}

/// The reduced equation system together with the mapping back.
#[derive(Debug, Clone)]
pub struct EndComponentElimination {
    pub information: SparseMdpEndComponentInformation,
    pub submatrix: SparseMatrix,
    /// Per reduced row, the probability to move into the `sum_columns` states.
    pub column_sums: Vec<f64>,
    /// Per reduced row, the `summand` value of the original row (0 for added sink rows).
    pub summands: Vec<f64>,
}

impl SparseMdpEndComponentInformation {
    fn new(mecs: &MaximalEndComponentDecomposition, maybe_states: &BitVector) -> SparseMdpEndComponentInformation {
        let maybe_states_before = maybe_states.number_of_set_bits_before_indices();
        let number_of_maybe_states = maybe_states.number_of_set_bits();
        let mut maybe_state_to_ec = vec![None; number_of_maybe_states];
        let mut number_of_maybe_states_in_ec = 0;
        for (ec_index, mec) in mecs.iter().enumerate() {
            for state in mec.states() {
                maybe_state_to_ec[maybe_states_before[state]] = Some(ec_index);
                number_of_maybe_states_in_ec += 1;
            }
        }
        let mut maybe_states_not_in_ec_before = Vec::with_capacity(number_of_maybe_states);
        let mut count = 0;
        for ec in maybe_state_to_ec.iter() {
            maybe_states_not_in_ec_before.push(count);
            if ec.is_none() {
                count += 1;
            }
        }
        SparseMdpEndComponentInformation {
            eliminated_end_components: !mecs.is_empty(),
            number_of_maybe_states_in_ec,
            number_of_maybe_states_not_in_ec: number_of_maybe_states - number_of_maybe_states_in_ec,
            number_of_ec: mecs.len(),
            maybe_states_before,
            maybe_state_to_ec,
            maybe_states_not_in_ec_before,
        }
    }

    pub fn eliminated_end_components(&self) -> bool {
        self.eliminated_end_components
    }

    pub fn number_of_maybe_states_in_ec(&self) -> usize {
        self.number_of_maybe_states_in_ec
    }

    pub fn number_of_maybe_states_not_in_ec(&self) -> usize {
        self.number_of_maybe_states_not_in_ec
    }

    pub fn number_of_ec(&self) -> usize {
        self.number_of_ec
    }

    pub fn row_group_count(&self) -> usize {
        self.number_of_maybe_states_not_in_ec + self.number_of_ec
    }

    /// Row group of the (maybe) state `state` in the reduced system.
    pub fn row_group_after_elimination(&self, state: usize) -> usize {
        let compact = self.maybe_states_before[state];
        match self.maybe_state_to_ec[compact] {
            Some(ec) => self.number_of_maybe_states_not_in_ec + ec,
            None => self.maybe_states_not_in_ec_before[compact],
        }
    }

    /// Scatters the solution of the reduced system onto the maybe states of `result`.
    pub fn set_values(&self, result: &mut [f64], maybe_states: &BitVector, from_result: &[f64]) {
        for state in maybe_states.iter() {
            result[state] = from_result[self.row_group_after_elimination(state)];
        }
    }

    /// Builds the reduced system over `maybe_states`. Rows not in
    /// `selected_choices` are ignored, rows internal to an EC are dropped and
    /// successors outside the maybe states are removed from the matrix (their
    /// mass into `sum_columns` is recorded in `column_sums`).
    pub fn eliminate_end_components(
        mecs: &MaximalEndComponentDecomposition,
        matrix: &SparseMatrix,
        maybe_states: &BitVector,
        sum_columns: Option<&BitVector>,
        selected_choices: Option<&BitVector>,
        summand: Option<&[f64]>,
    ) -> EndComponentElimination {
        let information = SparseMdpEndComponentInformation::new(mecs, maybe_states);
        let mut builder = SparseMatrixBuilder::new();
        let mut column_sums = Vec::new();
        let mut summands = Vec::new();
        let mut current_row = 0;

        let mut add_row = |builder: &mut SparseMatrixBuilder, row: Option<usize>, current_row: usize| {
            let mut column_sum = 0.0;
            if let Some(row) = row {
                for entry in matrix.row(row) {
                    if maybe_states.get(entry.column) {
                        builder.add_next_value(current_row, information.row_group_after_elimination(entry.column), entry.value);
                    } else if sum_columns.map_or(false, |c| c.get(entry.column)) {
                        column_sum += entry.value;
                    }
                }
            }
            column_sums.push(column_sum);
            summands.push(row.and_then(|r| summand.map(|s| s[r])).unwrap_or(0.0));
        };

        let states_in_ec = mecs.states(matrix.row_group_count());
        for state in maybe_states.iter().filter(|s| !states_in_ec.get(*s)) {
            builder.new_row_group(current_row);
            for row in matrix.row_group(state) {
                if selected_choices.map_or(true, |c| c.get(row)) {
                    add_row(&mut builder, Some(row), current_row);
                    current_row += 1;
                }
            }
        }

        for mec in mecs.iter() {
            builder.new_row_group(current_row);
            let start = current_row;
            for (state, internal_choices) in mec.iter() {
                for row in matrix.row_group(state) {
                    if internal_choices.contains(&row) || !selected_choices.map_or(true, |c| c.get(row)) {
                        continue;
                    }
                    add_row(&mut builder, Some(row), current_row);
                    current_row += 1;
                }
            }
            if current_row == start {
                // staying inside forever is the only option
                debug!("EC without exiting choices gets an empty sink row");
                add_row(&mut builder, None, current_row);
                current_row += 1;
            }
        }

        let submatrix = builder.build(current_row, information.row_group_count());
        debug!(
            "Eliminated {} EC(s) covering {} maybe states; {} row groups remain",
            information.number_of_ec,
            information.number_of_maybe_states_in_ec,
            submatrix.row_group_count()
        );
        EndComponentElimination { information, submatrix, column_sums, summands }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn collapses_cycle_into_one_group() {
        // 0 <-> 1 cycle; 0 may exit to the target 2 (w.p. 0.5, else 3), 1 may exit to 3
        let m = SparseMatrix::from_choices(&[
            vec![vec![(1, 1.0)], vec![(2, 0.5), (3, 0.5)]],
            vec![vec![(0, 1.0)], vec![(3, 1.0)]],
            vec![vec![(2, 1.0)]],
            vec![vec![(3, 1.0)]],
        ]);
        let maybe = BitVector::from_indices(4, vec![0, 1]);
        let target = BitVector::from_indices(4, vec![2]);
        let mecs = MaximalEndComponentDecomposition::for_subsystem(&m, &maybe, None);
        assert_eq!(mecs.len(), 1);
        let elim = SparseMdpEndComponentInformation::eliminate_end_components(&mecs, &m, &maybe, Some(&target), None, None);
        assert!(elim.information.eliminated_end_components());
        assert_eq!(elim.submatrix.row_group_count(), 1);
        assert_eq!(elim.submatrix.row_count(), 2);
        assert_eq!(elim.column_sums, vec![0.5, 0.0]);
        assert_eq!(elim.information.row_group_after_elimination(0), 0);
        assert_eq!(elim.information.row_group_after_elimination(1), 0);

        let mut result = vec![0.0, 0.0, 1.0, 0.0];
        elim.information.set_values(&mut result, &maybe, &[0.5]);
        assert_eq!(result, vec![0.5, 0.5, 1.0, 0.0]);
    }

    #[test]
    fn non_ec_states_come_first() {
        // 0 -> {1,2}; 1 <-> 2 cycle with exit from 2 to 3
        let m = SparseMatrix::from_choices(&[
            vec![vec![(1, 0.5), (2, 0.5)]],
            vec![vec![(2, 1.0)]],
            vec![vec![(1, 1.0)], vec![(3, 1.0)]],
            vec![vec![(3, 1.0)]],
        ]);
        let maybe = BitVector::from_indices(4, vec![0, 1, 2]);
        let mecs = MaximalEndComponentDecomposition::for_subsystem(&m, &maybe, None);
        let elim = SparseMdpEndComponentInformation::eliminate_end_components(&mecs, &m, &maybe, None, None, Some(&[1.0, 2.0, 3.0, 4.0, 5.0]));
        assert_eq!(elim.information.row_group_after_elimination(0), 0);
        assert_eq!(elim.information.row_group_after_elimination(2), 1);
        // state 0 now moves to the collapsed group with probability one
        assert_eq!(elim.submatrix.row(0).len(), 1);
        assert_eq!(elim.submatrix.row(0)[0].column, 1);
        assert!((elim.submatrix.row(0)[0].value - 1.0).abs() < 1e-12);
        assert_eq!(elim.summands, vec![1.0, 4.0]);
    }
}
