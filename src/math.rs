use ndarray::{Array1, Array2};
use ndarray_linalg::error::LinalgError;
use ndarray_linalg::{Diag, Scalar, SolveTriangular, QR, UPLO};

use crate::error::ModelError;

/// Relative size below which a diagonal element of the `R` factor is treated as zero.
pub const RANK_TOLERANCE: f64 = 1e-10;

/// Generate the design matrix whose columns are `x` raised to each of `powers`
///
/// This is a Vandermonde matrix with an arbitrary (possibly sparse) set of exponents. Row `i`
/// holds `[x_i^p_0, x_i^p_1, ...]`, so `powers = [0, 1, 3]` gives the Steinhart-Hart basis when
/// `x` holds the logarithms of the calibration resistances.
///
/// # Examples
///
/// ```
/// use thermistor_lut::math::power_basis;
/// use ndarray::arr2;
///
/// let observations: Vec<f64> = vec![2., 3.];
/// let basis = power_basis(&observations, &[0, 1, 3]);
///
/// let expected = arr2(&[[1., 2., 8.], [1., 3., 27.]]);
/// assert_eq!(basis, expected);
/// ```
pub fn power_basis<T: Copy + Scalar>(x: &[T], powers: &[i32]) -> Array2<T> {
    Array2::from_shape_fn((x.len(), powers.len()), |(ii, jj)| x[ii].powi(powers[jj]))
}

/// Solves an overdetermined linear system in the least-squares sense
///
/// Implementations return the coefficient vector minimising `|design * x - target|`, or
/// [`ModelError::SingularSystem`] when the design matrix does not have full column rank.
pub trait LinearSolver {
    /// # Errors
    /// - [`ModelError::InsufficientData`] if there are fewer rows than columns
    /// - [`ModelError::SingularSystem`] if the design matrix is rank deficient
    fn factorize_and_solve(
        &self,
        design: &Array2<f64>,
        target: &Array1<f64>,
    ) -> Result<Array1<f64>, ModelError>;
}

/// Least squares by Householder QR followed by back-substitution
///
/// Solving `R x = Q^T y` avoids forming the Gram matrix `X^T X`, whose condition number is the
/// square of that of `X`.
#[derive(Clone, Copy, Debug)]
pub struct QrSolver {
    rank_tolerance: f64,
}

impl Default for QrSolver {
    fn default() -> Self {
        Self {
            rank_tolerance: RANK_TOLERANCE,
        }
    }
}

impl QrSolver {
    /// Fails at the first diagonal element of `r` that is non-finite or negligible compared to
    /// the largest one.
    fn check_rank(&self, r: &Array2<f64>) -> Result<(), ModelError> {
        let diag = r.diag();
        let scale = diag.iter().fold(0.0_f64, |acc, value| acc.max(value.abs()));
        for (column, value) in diag.iter().enumerate() {
            let ratio = value.abs() / scale;
            if !ratio.is_finite() || ratio <= self.rank_tolerance {
                return Err(ModelError::SingularSystem { column, ratio });
            }
        }
        Ok(())
    }
}

impl LinearSolver for QrSolver {
    fn factorize_and_solve(
        &self,
        design: &Array2<f64>,
        target: &Array1<f64>,
    ) -> Result<Array1<f64>, ModelError> {
        assert_eq!(
            design.nrows(),
            target.len(),
            "design matrix and target vector must have the same number of rows"
        );
        if design.nrows() < design.ncols() {
            return Err(ModelError::InsufficientData {
                found: design.nrows(),
                required: design.ncols(),
            });
        }

        // LAPACK only reports argument errors here, which the shape checks above exclude, so any
        // failure means the factorisation is unusable.
        let lapack_failure = |_: LinalgError| ModelError::SingularSystem {
            column: 0,
            ratio: f64::NAN,
        };

        // Reduced factorisation: `q` is (n x m), `r` is (m x m) and upper triangular
        let (q, r) = design.qr().map_err(lapack_failure)?;
        self.check_rank(&r)?;

        let rhs = q.t().dot(target);
        let solution = r
            .solve_triangular(UPLO::Upper, Diag::NonUnit, &rhs)
            .map_err(lapack_failure)?;

        if solution.iter().any(|value| !value.is_finite()) {
            return Err(ModelError::SingularSystem {
                column: 0,
                ratio: f64::NAN,
            });
        }

        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::{power_basis, LinearSolver, QrSolver};
    use crate::error::ModelError;

    use ndarray::{arr1, arr2, Array, Array1, Array2};
    use ndarray_linalg::LeastSquaresSvd;
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::{rand::Rng, RandomExt};
    use rand_isaac::isaac64::Isaac64Rng;

    #[test]
    fn power_basis_matrices_are_generated_correctly() {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let num_data_points = 10;
        let powers = [0, 1, 3];

        let data_points = (0..num_data_points)
            .map(|_| rng.gen())
            .collect::<Vec<f64>>();

        let basis = power_basis(&data_points, &powers);

        assert_eq!(basis.dim(), (num_data_points, powers.len()));
        for (ii, data_point) in data_points.iter().enumerate() {
            for (jj, power) in powers.iter().enumerate() {
                approx::assert_relative_eq!(data_point.powi(*power), basis[[ii, jj]]);
            }
        }
    }

    #[test]
    fn square_systems_are_solved_exactly() {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let design: Array2<f64> =
            Array::random_using((3, 3), Uniform::new(0., 1.), &mut rng) + Array2::<f64>::eye(3) * 3.;
        let expected: Array1<f64> = Array::random_using(3, Uniform::new(-10., 10.), &mut rng);
        let target = design.dot(&expected);

        let solution = QrSolver::default()
            .factorize_and_solve(&design, &target)
            .unwrap();

        for (expected, calculated) in expected.iter().zip(solution.iter()) {
            approx::assert_relative_eq!(expected, calculated, max_relative = 1e-10);
        }
    }

    #[test]
    fn overdetermined_systems_match_svd_least_squares() {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let num_rows = rng.gen_range(5..50);
        let x: Vec<f64> = (0..num_rows).map(|_| rng.gen_range(1.0..3.0)).collect();
        let design = power_basis(&x, &[0, 1, 3]);
        let target: Array1<f64> = Array::random_using(num_rows, Uniform::new(0., 1.), &mut rng);

        let solution = QrSolver::default()
            .factorize_and_solve(&design, &target)
            .unwrap();
        let reference = design.least_squares(&target).unwrap().solution;

        for (expected, calculated) in reference.iter().zip(solution.iter()) {
            approx::assert_relative_eq!(expected, calculated, max_relative = 1e-8);
        }
    }

    #[test]
    fn duplicate_columns_are_rejected_as_singular() {
        let design = arr2(&[[1., 2., 2.], [1., 3., 3.], [1., 5., 5.], [1., 7., 7.]]);
        let target = arr1(&[1., 2., 3., 4.]);

        let result = QrSolver::default().factorize_and_solve(&design, &target);

        assert!(matches!(
            result,
            Err(ModelError::SingularSystem { column: 2, .. })
        ));
    }

    #[test]
    fn underdetermined_systems_are_rejected() {
        let design = arr2(&[[1., 2., 8.], [1., 3., 27.]]);
        let target = arr1(&[1., 2.]);

        let result = QrSolver::default().factorize_and_solve(&design, &target);

        assert_eq!(
            result,
            Err(ModelError::InsufficientData {
                found: 2,
                required: 3
            })
        );
    }
}
