pub mod noise;
pub mod signal;

pub use noise::*;
pub use signal::*;

/// mean squared error over the common prefix of `a` and `b`
pub fn compute_mse(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len()).max(1) as f32;
    a.iter()
        .zip(b.iter())
        .fold(0.0, |acc, (y, y_est)| acc + (y - y_est).powf(2.0))
        / n
}

/// # Description
/// signal to noise ratio of `estimate` against `reference`, in dB
/// ## Comments
/// - returns `f32::INFINITY` for a perfect reconstruction
pub fn compute_snr(reference: &[f32], estimate: &[f32]) -> f32 {
    let signal = reference.iter().fold(0.0, |acc, x| acc + x * x);
    let noise = reference
        .iter()
        .zip(estimate.iter())
        .fold(0.0, |acc, (x, y)| acc + (x - y).powf(2.0));
    if noise <= 0.0 {
        f32::INFINITY
    } else {
        10.0 * (signal / noise).log10()
    }
}

#[cfg(test)]
mod test {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn sanity() {
        assert_eq!(compute_mse(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
        assert_eq!(compute_mse(&[0.0, 0.0], &[1.0, 1.0]), 1.0);
        assert!(compute_snr(&[1.0], &[1.0]).is_infinite());
        assert!((compute_snr(&[1.0, 1.0], &[1.1, 0.9]) - 20.0).abs() < 1e-3);
    }
}
