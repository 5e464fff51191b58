//! Small fixed-size tensor utilities shared by the kernels.
//!
//! Voigt ordering:
//! - 2D: 00, 11, 01
//! - 3D: 00, 11, 22, 01, 12, 20
//!
//! Shear rows of a Voigt strain carry engineering shear (2·E_ij), so a
//! material tangent `D` maps a strain vector to stress components directly.

use nalgebra::{DMatrix, SMatrix, SVector};

const VOIGT_2D: [(usize, usize); 3] = [(0, 0), (1, 1), (0, 1)];
const VOIGT_3D: [(usize, usize); 6] = [(0, 0), (1, 1), (2, 2), (0, 1), (1, 2), (2, 0)];

/// Index pairs of the Voigt rows for a tensor of dimension `dim`
pub fn voigt_pairs(dim: usize) -> &'static [(usize, usize)] {
    if dim == 2 { &VOIGT_2D } else { &VOIGT_3D }
}

/// Determinant of a small square matrix
pub fn det<const D: usize>(m: &SMatrix<f64, D, D>) -> f64 {
    match D {
        1 => m[(0, 0)],
        2 => m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)],
        3 => {
            m[(0, 0)] * (m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)])
                - m[(0, 1)] * (m[(1, 0)] * m[(2, 2)] - m[(1, 2)] * m[(2, 0)])
                + m[(0, 2)] * (m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)])
        }
        _ => DMatrix::from_column_slice(D, D, m.as_slice()).determinant(),
    }
}

/// Inverse of a small square matrix, `None` when singular
pub fn inverse<const D: usize>(m: &SMatrix<f64, D, D>) -> Option<SMatrix<f64, D, D>> {
    let d = det(m);
    if d == 0.0 || !d.is_finite() {
        return None;
    }
    let mut inv = SMatrix::<f64, D, D>::zeros();
    match D {
        1 => inv[(0, 0)] = 1.0 / d,
        2 => {
            inv[(0, 0)] = m[(1, 1)] / d;
            inv[(0, 1)] = -m[(0, 1)] / d;
            inv[(1, 0)] = -m[(1, 0)] / d;
            inv[(1, 1)] = m[(0, 0)] / d;
        }
        3 => {
            // Adjugate: inv(i, j) = cof(j, i) / det
            for i in 0..3 {
                for j in 0..3 {
                    let (r0, r1) = ((j + 1) % 3, (j + 2) % 3);
                    let (c0, c1) = ((i + 1) % 3, (i + 2) % 3);
                    inv[(i, j)] = (m[(r0, c0)] * m[(r1, c1)] - m[(r0, c1)] * m[(r1, c0)]) / d;
                }
            }
        }
        _ => {
            let dynamic = DMatrix::from_column_slice(D, D, m.as_slice()).try_inverse()?;
            inv.copy_from_slice(dynamic.as_slice());
        }
    }
    Some(inv)
}

/// Symmetric part ½(A + Aᵀ)
pub fn symmetric<const D: usize>(m: &SMatrix<f64, D, D>) -> SMatrix<f64, D, D> {
    (m + m.transpose()) * 0.5
}

/// Deviatoric part A − (tr A / D)·I
pub fn deviator<const D: usize>(m: &SMatrix<f64, D, D>) -> SMatrix<f64, D, D> {
    let mean = m.trace() / D as f64;
    m - SMatrix::<f64, D, D>::identity() * mean
}

/// Pack a symmetric tensor into Voigt form
pub fn to_voigt<const D: usize, const NV: usize>(m: &SMatrix<f64, D, D>) -> SVector<f64, NV> {
    let mut v = SVector::<f64, NV>::zeros();
    for (p, &(i, j)) in voigt_pairs(D).iter().enumerate().take(NV) {
        v[p] = m[(i, j)];
    }
    v
}

/// Unpack a Voigt vector into a symmetric tensor
pub fn from_voigt<const D: usize, const NV: usize>(v: &SVector<f64, NV>) -> SMatrix<f64, D, D> {
    let mut m = SMatrix::<f64, D, D>::zeros();
    for (p, &(i, j)) in voigt_pairs(D).iter().enumerate().take(NV) {
        m[(i, j)] = v[p];
        m[(j, i)] = v[p];
    }
    m
}

/// Green-Lagrange strain E = ½(FᵀF − I)
pub fn green_lagrange<const D: usize>(f: &SMatrix<f64, D, D>) -> SMatrix<f64, D, D> {
    (f.transpose() * f - SMatrix::<f64, D, D>::identity()) * 0.5
}
