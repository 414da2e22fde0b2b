use crate::environment::MultiplicationStyle;
use crate::solver::OptimizationDirection;
use crate::storage::SparseMatrix;

/// Matrix-vector products over a row-grouped matrix, either in Jacobi style
/// (into a separate result vector) or Gauss-Seidel style (in place).
pub struct Multiplier<'a> {
    matrix: &'a SparseMatrix,
    style: MultiplicationStyle,
}

impl<'a> Multiplier<'a> {
    pub fn new(matrix: &'a SparseMatrix, style: MultiplicationStyle) -> Multiplier<'a> {
        Multiplier { matrix, style }
    }

    pub fn style(&self) -> MultiplicationStyle {
        self.style
    }

    /// One Bellman step. With Gauss-Seidel, `x` is updated in place and `result`
    /// receives the same values.
    pub fn multiply_and_reduce(
        &self,
        dir: OptimizationDirection,
        x: &mut [f64],
        b: Option<&[f64]>,
        result: &mut [f64],
        choices: Option<&mut [usize]>,
    ) {
        match self.style {
            MultiplicationStyle::Regular => self.matrix.multiply_and_reduce(dir, x, b, result, choices),
            MultiplicationStyle::GaussSeidel => {
                self.multiply_and_reduce_gauss_seidel(dir, x, b, choices);
                result.copy_from_slice(x);
            }
        }
    }

    pub fn multiply_and_reduce_gauss_seidel(
        &self,
        dir: OptimizationDirection,
        x: &mut [f64],
        b: Option<&[f64]>,
        mut choices: Option<&mut [usize]>,
    ) {
        for group in 0..self.matrix.row_group_count() {
            let (value, choice) = self.matrix.reduce_row_group(dir, group, x, b);
            x[group] = value;
            if let Some(c) = choices.as_deref_mut() {
                c[group] = choice;
            }
        }
    }

    /// `n` Jacobi Bellman steps starting from `x`.
    pub fn repeated_multiply_and_reduce(&self, dir: OptimizationDirection, x: &mut Vec<f64>, b: Option<&[f64]>, n: usize) {
        let mut result = vec![0.0; self.matrix.row_group_count()];
        for _ in 0..n {
            self.matrix.multiply_and_reduce(dir, x, b, &mut result, None);
            std::mem::swap(x, &mut result);
        }
    }

}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn gauss_seidel_uses_fresh_values() {
        // 0 -> 1, 1 -> 1 with b = [0, 1]
        let m = SparseMatrix::from_choices(&[vec![vec![(1, 1.0)]], vec![vec![(1, 1.0)]]]);
        let b = vec![0.0, 1.0];
        let mut jacobi = vec![0.0, 0.0];
        let mut result = vec![0.0; 2];
        Multiplier::new(&m, MultiplicationStyle::Regular).multiply_and_reduce(
            OptimizationDirection::Maximize,
            &mut jacobi,
            Some(&b),
            &mut result,
            None,
        );
        assert_eq!(result, vec![0.0, 1.0]);

        // row group 1 is updated after 0, so 0 only sees the old value
        let mut gs = vec![0.0, 0.0];
        Multiplier::new(&m, MultiplicationStyle::GaussSeidel).multiply_and_reduce_gauss_seidel(
            OptimizationDirection::Maximize,
            &mut gs,
            Some(&b),
            None,
        );
        assert_eq!(gs, vec![0.0, 1.0]);
    }

    #[test]
    fn repeated_steps() {
        let m = SparseMatrix::from_choices(&[vec![vec![(0, 0.5), (1, 0.5)], vec![(0, 1.0)]], vec![vec![(1, 1.0)]]]);
        let mut x = vec![0.0, 1.0];
        Multiplier::new(&m, MultiplicationStyle::Regular).repeated_multiply_and_reduce(OptimizationDirection::Maximize, &mut x, None, 2);
        assert!((x[0] - 0.75).abs() < 1e-12);
        let mut x = vec![0.0, 1.0];
        Multiplier::new(&m, MultiplicationStyle::Regular).repeated_multiply_and_reduce(OptimizationDirection::Minimize, &mut x, None, 2);
        assert_eq!(x[0], 0.0);
    }
}
