//! Row-grouped sparse matrix.
//!
//! Every state (row group) owns the contiguous rows
//! `row_group_indices[s]..row_group_indices[s + 1]`, one row per nondeterministic
//! choice. Each row is a sparse distribution sorted by column.

use std::ops::Range;

use itertools::Itertools;

use crate::error::{CheckError, Result};
use crate::solver::OptimizationDirection;
use crate::storage::BitVector;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixEntry {
    pub column: usize,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SparseMatrix {
    row_group_indices: Vec<usize>,
    row_indications: Vec<usize>,
    entries: Vec<MatrixEntry>,
    column_count: usize,
}

/// Incremental construction of a [`SparseMatrix`]. Rows must be added in
/// increasing order; within a row, entries may come in any order and
/// duplicate columns are summed.
#[derive(Debug, Default)]
pub struct SparseMatrixBuilder {
    rows: Vec<Vec<MatrixEntry>>,
    row_group_indices: Vec<usize>,
}

impl SparseMatrixBuilder {
    pub fn new() -> SparseMatrixBuilder {
        SparseMatrixBuilder::default()
    }

    /// Starts a new row group whose first row is `starting_row`.
    pub fn new_row_group(&mut self, starting_row: usize) {
        debug_assert!(self.row_group_indices.last().map_or(true, |x| *x <= starting_row));
        self.row_group_indices.push(starting_row);
    }

    pub fn add_next_value(&mut self, row: usize, column: usize, value: f64) {
        debug_assert!(row + 1 >= self.rows.len(), "rows must be added in order");
        while self.rows.len() <= row {
            self.rows.push(Vec::new());
        }
        self.rows[row].push(MatrixEntry { column, value });
    }

    /// Finalizes the matrix. Rows without entries up to `row_count` are created
    /// empty. Without explicit row groups, every row is its own group.
    pub fn build(mut self, row_count: usize, column_count: usize) -> SparseMatrix {
        while self.rows.len() < row_count {
            self.rows.push(Vec::new());
        }
        let row_count = self.rows.len();
        let mut row_group_indices = if self.row_group_indices.is_empty() {
            (0..row_count).collect::<Vec<_>>()
        } else {
            self.row_group_indices
        };
        row_group_indices.push(row_count);

        let mut row_indications = Vec::with_capacity(row_count + 1);
        let mut entries = Vec::new();
        for row in self.rows.into_iter() {
            row_indications.push(entries.len());
            let merged = row
                .into_iter()
                .sorted_by_key(|e| e.column)
                .coalesce(|a, b| {
                    if a.column == b.column {
                        Ok(MatrixEntry { column: a.column, value: a.value + b.value })
                    } else {
                        Err((a, b))
                    }
                });
            entries.extend(merged);
        }
        row_indications.push(entries.len());
        SparseMatrix { row_group_indices, row_indications, entries, column_count }
    }
}

impl SparseMatrix {
    /// Builds a matrix from explicit choice lists: `choices[s]` holds the
    /// distributions (as `(successor, probability)` pairs) of state `s`.
    pub fn from_choices(choices: &[Vec<Vec<(usize, f64)>>]) -> SparseMatrix {
        let mut builder = SparseMatrixBuilder::new();
        let mut row = 0;
        for state_choices in choices.iter() {
            builder.new_row_group(row);
            for distribution in state_choices.iter() {
                for (column, value) in distribution.iter() {
                    builder.add_next_value(row, *column, *value);
                }
                row += 1;
            }
        }
        builder.build(row, choices.len())
    }

    pub fn row_group_count(&self) -> usize {
        self.row_group_indices.len() - 1
    }

    pub fn row_count(&self) -> usize {
        self.row_indications.len() - 1
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn row_group_indices(&self) -> &[usize] {
        &self.row_group_indices
    }

    pub fn row_group(&self, group: usize) -> Range<usize> {
        self.row_group_indices[group]..self.row_group_indices[group + 1]
    }

    pub fn row_group_size(&self, group: usize) -> usize {
        self.row_group_indices[group + 1] - self.row_group_indices[group]
    }

    pub fn has_trivial_row_grouping(&self) -> bool {
        self.row_group_count() == self.row_count()
    }

    pub fn row(&self, row: usize) -> &[MatrixEntry] {
        &self.entries[self.row_indications[row]..self.row_indications[row + 1]]
    }

    pub fn row_sum(&self, row: usize) -> f64 {
        self.row(row).iter().map(|e| e.value).sum()
    }

    /// For a matrix with trivial row grouping (e.g. a transposed matrix) the
    /// entries of row `s`.
    pub fn row_of_group(&self, group: usize) -> &[MatrixEntry] {
        let range = self.row_group(group);
        &self.entries[self.row_indications[range.start]..self.row_indications[range.end]]
    }

    /// Checks that every row is a probability distribution up to `epsilon`.
    pub fn is_probabilistic(&self, epsilon: f64) -> bool {
        (0..self.row_count()).all(|row| {
            self.row(row).iter().all(|e| e.value >= 0.0) && (self.row_sum(row) - 1.0).abs() <= epsilon
        })
    }

    /// Checks that every row sums to at most one and has no negative entries.
    pub fn is_sub_probabilistic(&self, epsilon: f64) -> bool {
        (0..self.row_count()).all(|row| {
            self.row(row).iter().all(|e| e.value >= 0.0) && self.row_sum(row) <= 1.0 + epsilon
        })
    }

    /// Validates the shape of a transition matrix: square in states, stochastic rows.
    pub fn check_stochastic(&self, epsilon: f64) -> Result<()> {
        if self.column_count != self.row_group_count() {
            return Err(CheckError::InvalidModel(format!(
                "transition matrix has {} row groups but {} columns",
                self.row_group_count(),
                self.column_count
            )));
        }
        for state in 0..self.row_group_count() {
            if self.row_group_size(state) == 0 {
                return Err(CheckError::InvalidModel(format!("state {} has no choices", state)));
            }
            for row in self.row_group(state) {
                if self.row(row).iter().any(|e| e.column >= self.column_count || e.value < 0.0)
                    || (self.row_sum(row) - 1.0).abs() > epsilon
                {
                    return Err(CheckError::InvalidModel(format!(
                        "choice {} of state {} is not a probability distribution (sum {})",
                        row - self.row_group_indices[state],
                        state,
                        self.row_sum(row)
                    )));
                }
            }
        }
        Ok(())
    }

    /// Keeps all rows of the row groups in `row_group_constraint` and the columns
    /// in `column_constraint`; columns are renumbered to the compacted index space.
    pub fn submatrix(&self, row_group_constraint: &BitVector, column_constraint: &BitVector) -> SparseMatrix {
        let column_map = column_constraint.number_of_set_bits_before_indices();
        let mut builder = SparseMatrixBuilder::new();
        let mut current_row = 0;
        for group in row_group_constraint.iter() {
            builder.new_row_group(current_row);
            for row in self.row_group(group) {
                for entry in self.row(row) {
                    if column_constraint.get(entry.column) {
                        builder.add_next_value(current_row, column_map[entry.column], entry.value);
                    }
                }
                current_row += 1;
            }
        }
        builder.build(current_row, column_constraint.number_of_set_bits())
    }

    /// Keeps the rows in `row_constraint` (a bit vector over rows). Row groups
    /// without any selected row are dropped.
    pub fn submatrix_from_rows(&self, row_constraint: &BitVector, column_constraint: &BitVector) -> SparseMatrix {
        let column_map = column_constraint.number_of_set_bits_before_indices();
        let mut builder = SparseMatrixBuilder::new();
        let mut current_row = 0;
        for group in 0..self.row_group_count() {
            let mut group_started = false;
            for row in self.row_group(group).filter(|r| row_constraint.get(*r)) {
                if !group_started {
                    builder.new_row_group(current_row);
                    group_started = true;
                }
                for entry in self.row(row) {
                    if column_constraint.get(entry.column) {
                        builder.add_next_value(current_row, column_map[entry.column], entry.value);
                    }
                }
                current_row += 1;
            }
        }
        builder.build(current_row, column_constraint.number_of_set_bits())
    }

    /// For every row of the constrained row groups, the probability mass that
    /// goes into `column_constraint`.
    pub fn constrained_row_group_sum_vector(&self, row_group_constraint: &BitVector, column_constraint: &BitVector) -> Vec<f64> {
        let mut result = Vec::new();
        for group in row_group_constraint.iter() {
            for row in self.row_group(group) {
                result.push(self.constrained_row_sum(row, column_constraint));
            }
        }
        result
    }

    /// Like [`constrained_row_group_sum_vector`](Self::constrained_row_group_sum_vector), over a row selection.
    pub fn constrained_row_sum_vector(&self, row_constraint: &BitVector, column_constraint: &BitVector) -> Vec<f64> {
        row_constraint.iter().map(|row| self.constrained_row_sum(row, column_constraint)).collect()
    }

    pub fn constrained_row_sum(&self, row: usize, column_constraint: &BitVector) -> f64 {
        self.row(row).iter().filter(|e| column_constraint.get(e.column)).map(|e| e.value).sum()
    }

    /// Selects the rows of the constrained row groups whose successors all lie in `column_constraint`.
    pub fn row_filter(&self, row_group_constraint: &BitVector, column_constraint: &BitVector) -> BitVector {
        let mut result = BitVector::new(self.row_count(), false);
        for group in row_group_constraint.iter() {
            for row in self.row_group(group) {
                if self.row(row).iter().all(|e| column_constraint.get(e.column)) {
                    result.set(row, true);
                }
            }
        }
        result
    }

    /// All rows of the given row groups.
    pub fn rows_of_groups(&self, row_group_constraint: &BitVector) -> BitVector {
        let mut result = BitVector::new(self.row_count(), false);
        for group in row_group_constraint.iter() {
            for row in self.row_group(group) {
                result.set(row, true);
            }
        }
        result
    }

    /// Backward transitions: row `s'` lists, with trivial grouping, every state
    /// `s` having a choice that moves to `s'` with positive probability.
    pub fn transpose(&self) -> SparseMatrix {
        let mut builder = SparseMatrixBuilder::new();
        let mut columns: Vec<Vec<MatrixEntry>> = vec![Vec::new(); self.column_count];
        for group in 0..self.row_group_count() {
            for row in self.row_group(group) {
                for entry in self.row(row) {
                    columns[entry.column].push(MatrixEntry { column: group, value: entry.value });
                }
            }
        }
        for (row, column) in columns.into_iter().enumerate() {
            for entry in column {
                builder.add_next_value(row, entry.column, entry.value);
            }
        }
        builder.build(self.column_count, self.row_group_count())
    }

    /// Backward transitions of the chain induced by picking the local choice
    /// `choices[s]` in every state `s`.
    pub fn transpose_selected_rows_from_row_groups(&self, choices: &[usize]) -> SparseMatrix {
        self.select_rows_from_row_groups(choices).transpose()
    }

    /// Matrix with trivial row grouping that keeps, per state, only the choice `choices[s]`.
    pub fn select_rows_from_row_groups(&self, choices: &[usize]) -> SparseMatrix {
        let mut builder = SparseMatrixBuilder::new();
        for (group, choice) in choices.iter().enumerate() {
            let row = self.row_group_indices[group] + choice;
            for entry in self.row(row) {
                builder.add_next_value(group, entry.column, entry.value);
            }
        }
        builder.build(choices.len(), self.column_count)
    }

    #[inline]
    pub fn multiply_row_with_vector(&self, row: usize, x: &[f64], b: Option<&[f64]>) -> f64 {
        let offset = b.map_or(0.0, |b| b[row]);
        self.row(row).iter().fold(offset, |acc, e| acc + e.value * x[e.column])
    }

    /// One Bellman step: for every row group, the optimal row value of `b + A x`.
    /// If `choices` is given, the local index of the optimal row is recorded.
    pub fn multiply_and_reduce(
        &self,
        dir: OptimizationDirection,
        x: &[f64],
        b: Option<&[f64]>,
        result: &mut [f64],
        mut choices: Option<&mut [usize]>,
    ) {
        for group in 0..self.row_group_count() {
            let (value, choice) = self.reduce_row_group(dir, group, x, b);
            result[group] = value;
            if let Some(c) = choices.as_deref_mut() {
                c[group] = choice;
            }
        }
    }

    /// Optimal value and local choice index of one row group.
    pub fn reduce_row_group(&self, dir: OptimizationDirection, group: usize, x: &[f64], b: Option<&[f64]>) -> (f64, usize) {
        let start = self.row_group_indices[group];
        let mut best = self.multiply_row_with_vector(start, x, b);
        let mut best_choice = 0;
        for row in (start + 1)..self.row_group_indices[group + 1] {
            let value = self.multiply_row_with_vector(row, x, b);
            if dir.is_better(value, best) {
                best = value;
                best_choice = row - start;
            }
        }
        (best, best_choice)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn example() -> SparseMatrix {
        // state 0: [0 -> 1 (1.0)], [0 -> 0 (0.5), 2 (0.5)]; state 1 and 2 absorbing
        SparseMatrix::from_choices(&[
            vec![vec![(1, 1.0)], vec![(2, 0.5), (0, 0.5)]],
            vec![vec![(1, 1.0)]],
            vec![vec![(2, 1.0)]],
        ])
    }

    #[test]
    fn builds_row_groups() {
        let m = example();
        assert_eq!(m.row_group_count(), 3);
        assert_eq!(m.row_count(), 4);
        assert_eq!(m.row_group_indices(), &[0, 2, 3, 4]);
        assert_eq!(m.row(1)[0].column, 0, "entries are sorted by column");
        assert!(m.is_probabilistic(1e-12));
        assert!(m.check_stochastic(1e-12).is_ok());
    }

    #[test]
    fn duplicate_columns_are_summed() {
        let m = SparseMatrix::from_choices(&[vec![vec![(0, 0.25), (0, 0.75)]]]);
        assert_eq!(m.row(0), &[MatrixEntry { column: 0, value: 1.0 }]);
    }

    #[test]
    fn submatrix_and_constrained_sums() {
        let m = example();
        let maybe = BitVector::from_indices(3, vec![0]);
        let sub = m.submatrix(&maybe, &maybe);
        assert_eq!(sub.row_group_count(), 1);
        assert_eq!(sub.row_count(), 2);
        assert_eq!(sub.row(0).len(), 0);
        assert_eq!(sub.row(1), &[MatrixEntry { column: 0, value: 0.5 }]);
        let target = BitVector::from_indices(3, vec![1]);
        assert_eq!(m.constrained_row_group_sum_vector(&maybe, &target), vec![1.0, 0.0]);
    }

    #[test]
    fn row_filter_and_row_submatrix() {
        let m = example();
        let maybe = BitVector::from_indices(3, vec![0]);
        let not_infinity = BitVector::from_indices(3, vec![0, 1]);
        let selected = m.row_filter(&maybe, &not_infinity);
        assert_eq!(selected.iter().collect::<Vec<_>>(), vec![0]);
        let sub = m.submatrix_from_rows(&selected, &maybe);
        assert_eq!(sub.row_group_count(), 1);
        assert_eq!(sub.row_count(), 1);
    }

    #[test]
    fn transpose_lists_predecessors() {
        let m = example();
        let t = m.transpose();
        assert_eq!(t.row_group_count(), 3);
        let preds: Vec<usize> = t.row_of_group(2).iter().map(|e| e.column).collect();
        assert_eq!(preds, vec![0, 2]);
    }

    #[test]
    fn multiply_and_reduce_tracks_choice() {
        let m = example();
        let x = vec![0.0, 1.0, 0.0];
        let mut result = vec![0.0; 3];
        let mut choices = vec![0; 3];
        m.multiply_and_reduce(OptimizationDirection::Minimize, &x, None, &mut result, Some(&mut choices));
        assert_eq!(result, vec![0.0, 1.0, 0.0]);
        assert_eq!(choices[0], 1);
    }
}
