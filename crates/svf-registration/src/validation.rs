//! Validation of registration inputs and configuration values.

use burn::tensor::backend::Backend;
use svf_core::{Image, VectorField};
use crate::error::{RegistrationError, Result};

/// Validate iteration count.
pub fn validate_iterations(iterations: usize) -> Result<()> {
    if iterations == 0 {
        return Err(RegistrationError::invalid_configuration(
            "Iterations must be positive",
        ));
    }

    if iterations > 1_000_000 {
        return Err(RegistrationError::invalid_configuration(
            format!("Iterations too large: {}", iterations),
        ));
    }

    Ok(())
}

/// Validate a smoothing standard deviation.
pub fn validate_standard_deviation(sigma: f64) -> Result<()> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(RegistrationError::invalid_configuration(
            format!("Standard deviation must be positive, got {}", sigma),
        ));
    }
    Ok(())
}

/// Validate a Gaussian kernel truncation error.
pub fn validate_maximum_error(maximum_error: f64) -> Result<()> {
    if !(maximum_error > 0.0 && maximum_error < 1.0) {
        return Err(RegistrationError::invalid_configuration(
            format!("Maximum kernel error must lie in (0, 1), got {}", maximum_error),
        ));
    }
    Ok(())
}

/// Validate a Gaussian kernel width.
pub fn validate_kernel_width(width: usize) -> Result<()> {
    if width == 0 {
        return Err(RegistrationError::invalid_configuration(
            "Maximum kernel width must be positive",
        ));
    }
    Ok(())
}

/// Validate a value that must be finite and non-negative.
pub fn validate_non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(RegistrationError::invalid_configuration(
            format!("{} must be finite and non-negative, got {}", name, value),
        ));
    }
    Ok(())
}

/// Validate an optional convergence tolerance.
pub fn validate_tolerance(tolerance: Option<f64>) -> Result<()> {
    match tolerance {
        Some(t) if !t.is_finite() || t <= 0.0 => Err(RegistrationError::invalid_configuration(
            format!("Convergence tolerance must be positive, got {}", t),
        )),
        _ => Ok(()),
    }
}

/// Check that both images are present and share one grid.
pub fn validate_image_pair<'a, B: Backend, const D: usize>(
    fixed: Option<&'a Image<B, D>>,
    moving: Option<&'a Image<B, D>>,
) -> Result<(&'a Image<B, D>, &'a Image<B, D>)> {
    let fixed = fixed.ok_or_else(|| RegistrationError::invalid_input("fixed image not set"))?;
    let moving = moving.ok_or_else(|| RegistrationError::invalid_input("moving image not set"))?;
    fixed.grid().ensure_matches(moving.grid())?;
    Ok((fixed, moving))
}

/// Check that a field lives on the reference image's grid.
pub fn validate_field_grid<B: Backend, const D: usize>(
    reference: &Image<B, D>,
    field: &VectorField<B, D>,
) -> Result<()> {
    reference.grid().ensure_matches(field.grid())?;
    Ok(())
}
