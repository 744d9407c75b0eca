//! Deterministic input data for generated cases.

/// `n` values in `[-1, 1]`, exactly representable as float32.
pub fn gen_data(n: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let unit = (state >> 33) as f64 / (1u64 << 31) as f64;
            f64::from((unit * 2.0 - 1.0) as f32)
        })
        .collect()
}

/// Strictly positive values, for log-like inputs.
pub fn gen_positive_data(n: usize, seed: u64) -> Vec<f64> {
    gen_data(n, seed)
        .into_iter()
        .map(|x| f64::from((x.abs() + 0.01) as f32))
        .collect()
}
