use crate::error::{FxError, Result};

/// Normalized 1-D Gaussian of length `2 * radius + 1`.
///
/// Radius 0 is the identity kernel `[1.0]`.
pub fn gaussian_kernel_1d(radius: usize, sigma: f32) -> Result<Vec<f32>> {
    if radius == 0 {
        return Ok(vec![1.0]);
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(FxError::shape(format!("blur sigma must be > 0, got {sigma}")));
    }

    let r = radius as i64;
    let sigma = sigma as f64;
    let denom = 2.0 * sigma * sigma;
    let weights: Vec<f64> = (-r..=r)
        .map(|i| {
            let x = i as f64;
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    Ok(weights.into_iter().map(|w| (w / sum) as f32).collect())
}

/// Center tap followed by the `radius` taps to its right. The blur stage
/// mirrors them for the left side.
pub fn half_kernel(radius: usize, sigma: f32) -> Result<Vec<f32>> {
    let mut kernel = gaussian_kernel_1d(radius, sigma)?;
    Ok(kernel.split_off(radius))
}
