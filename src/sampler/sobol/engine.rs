//! Gray-code Sobol sequence generator.

use crate::error::{Error, Result};

/// Highest dimensionality supported by [`Engine`].
pub const MAX_DIM: usize = 21;

const MAX_BIT: usize = 32;

/// Primitive polynomial degree `s`, coefficients `a` and initial direction
/// numbers `m` for dimensions 2 through [`MAX_DIM`] (Joe & Kuo, 2008).
const DIRECTION_NUMBERS: [(usize, u32, &[u32]); MAX_DIM - 1] = [
    (1, 0, &[1]),
    (2, 1, &[1, 3]),
    (3, 1, &[1, 3, 1]),
    (3, 2, &[1, 1, 1]),
    (4, 1, &[1, 1, 3, 3]),
    (4, 4, &[1, 3, 5, 13]),
    (5, 2, &[1, 1, 5, 5, 17]),
    (5, 4, &[1, 1, 5, 5, 5]),
    (5, 7, &[1, 1, 7, 11, 19]),
    (5, 11, &[1, 1, 5, 1, 1]),
    (5, 13, &[1, 1, 1, 3, 11]),
    (5, 14, &[1, 3, 5, 5, 31]),
    (6, 1, &[1, 3, 3, 9, 7, 49]),
    (6, 13, &[1, 1, 1, 15, 21, 21]),
    (6, 16, &[1, 3, 1, 13, 27, 49]),
    (6, 19, &[1, 1, 1, 15, 7, 5]),
    (6, 22, &[1, 3, 1, 15, 13, 25]),
    (6, 25, &[1, 1, 5, 5, 19, 61]),
    (7, 1, &[1, 3, 7, 11, 23, 15, 103]),
    (7, 4, &[1, 3, 7, 13, 13, 15, 69]),
];

/// Sobol quasi-random number generator.
///
/// # Examples
///
/// ```
/// use hypertune::sampler::sobol::Engine;
///
/// let mut engine = Engine::new(2).unwrap();
/// assert_eq!(engine.draw(), vec![0.5, 0.5]);
/// assert_eq!(engine.draw(), vec![0.75, 0.25]);
/// ```
#[derive(Clone, Debug)]
pub struct Engine {
    dim: usize,
    n: u64,
    directions: Vec<[u32; MAX_BIT + 1]>,
    state: Vec<u32>,
}

impl Engine {
    /// Create an engine for `dim` dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `dim` exceeds [`MAX_DIM`].
    pub fn new(dim: usize) -> Result<Self> {
        if dim > MAX_DIM {
            return Err(Error::InvalidConfig(format!(
                "Sobol supports at most {MAX_DIM} dimensions, got {dim}"
            )));
        }
        Ok(Self {
            dim,
            n: 0,
            directions: (0..dim).map(direction_numbers).collect(),
            state: vec![0; dim],
        })
    }

    /// Number of dimensions.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of points drawn so far.
    #[must_use]
    pub fn n_drawn(&self) -> u64 {
        self.n
    }

    /// Draw the next point of the sequence.
    pub fn draw(&mut self) -> Vec<f64> {
        let c = lowest_zero_bit(self.n);
        self.n += 1;
        self.state
            .iter_mut()
            .zip(&self.directions)
            .map(|(x, v)| {
                *x ^= v.get(c).copied().unwrap_or(0);
                f64::from(*x) / 4_294_967_296.0
            })
            .collect()
    }

    /// Discard the next `n` points.
    pub fn skip(&mut self, n: u64) {
        for _ in 0..n {
            let c = lowest_zero_bit(self.n);
            self.n += 1;
            for (x, v) in self.state.iter_mut().zip(&self.directions) {
                *x ^= v.get(c).copied().unwrap_or(0);
            }
        }
    }
}

/// 1-based index of the lowest zero bit of `n`.
fn lowest_zero_bit(n: u64) -> usize {
    n.trailing_ones() as usize + 1
}

fn direction_numbers(j: usize) -> [u32; MAX_BIT + 1] {
    let mut v = [0_u32; MAX_BIT + 1];
    if j == 0 {
        for (i, vi) in v.iter_mut().enumerate().skip(1) {
            *vi = 1 << (32 - i);
        }
        return v;
    }

    let (s, a, m) = DIRECTION_NUMBERS[j - 1];
    for (i, &mi) in m.iter().enumerate() {
        v[i + 1] = mi << (31 - i);
    }
    for i in s + 1..=MAX_BIT {
        let mut x = v[i - s] ^ (v[i - s] >> s);
        for k in 1..s {
            x ^= ((a >> (s - 1 - k)) & 1) * v[i - k];
        }
        v[i] = x;
    }
    v
}
