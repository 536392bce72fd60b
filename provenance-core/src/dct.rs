//! Orthonormal 2-D discrete cosine transform (DCT-II / DCT-III).
//!
//! Shared by the watermark codec (per-block transform) and the perceptual
//! hash (whole downsampled grid). The transform is separable and uses a
//! precomputed basis, so an `n`×`n` block costs `2n³` multiply-adds.
//!
//! Coefficients are stored row-major: `coeffs[v * n + u]` holds vertical
//! frequency `v` and horizontal frequency `u`.

/// Precomputed basis for an `n`×`n` transform.
#[derive(Debug, Clone)]
pub struct Dct2d {
    n: usize,
    /// `basis[k * n + i] = c(k) * cos((2i + 1) k π / 2n)`
    basis: Vec<f64>,
}

impl Dct2d {
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "DCT size must be positive");

        let scale_dc = (1.0 / n as f64).sqrt();
        let scale_ac = (2.0 / n as f64).sqrt();
        let mut basis = vec![0.0; n * n];
        for k in 0..n {
            let scale = if k == 0 { scale_dc } else { scale_ac };
            for i in 0..n {
                let angle = std::f64::consts::PI * (2 * i + 1) as f64 * k as f64 / (2 * n) as f64;
                basis[k * n + i] = scale * angle.cos();
            }
        }

        Self { n, basis }
    }

    /// Forward transform of a row-major `n`×`n` block.
    pub fn forward(&self, block: &[f64]) -> Vec<f64> {
        let n = self.n;
        debug_assert_eq!(block.len(), n * n);

        let mut rows = vec![0.0; n * n];
        for y in 0..n {
            for u in 0..n {
                let basis = &self.basis[u * n..(u + 1) * n];
                let line = &block[y * n..(y + 1) * n];
                rows[y * n + u] = basis.iter().zip(line).map(|(b, p)| b * p).sum();
            }
        }

        let mut out = vec![0.0; n * n];
        for v in 0..n {
            let basis = &self.basis[v * n..(v + 1) * n];
            for u in 0..n {
                out[v * n + u] = (0..n).map(|y| basis[y] * rows[y * n + u]).sum();
            }
        }
        out
    }

    /// Single coefficient `(v, u)` of a block without the full transform.
    pub fn coefficient(&self, block: &[f64], v: usize, u: usize) -> f64 {
        let n = self.n;
        let basis_v = &self.basis[v * n..(v + 1) * n];
        let basis_u = &self.basis[u * n..(u + 1) * n];
        (0..n)
            .map(|y| {
                let line = &block[y * n..(y + 1) * n];
                basis_v[y] * basis_u.iter().zip(line).map(|(b, p)| b * p).sum::<f64>()
            })
            .sum()
    }

    /// Inverse transform back to a row-major `n`×`n` block.
    pub fn inverse(&self, coeffs: &[f64]) -> Vec<f64> {
        let n = self.n;
        debug_assert_eq!(coeffs.len(), n * n);

        let mut cols = vec![0.0; n * n];
        for y in 0..n {
            for u in 0..n {
                cols[y * n + u] = (0..n)
                    .map(|v| self.basis[v * n + y] * coeffs[v * n + u])
                    .sum();
            }
        }

        let mut out = vec![0.0; n * n];
        for y in 0..n {
            for x in 0..n {
                out[y * n + x] = (0..n)
                    .map(|u| self.basis[u * n + x] * cols[y * n + u])
                    .sum();
            }
        }
        out
    }
}
