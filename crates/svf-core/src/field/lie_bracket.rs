//! Jacobians and the Lie bracket of vector fields.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use crate::error::Result;
use crate::field::VectorField;
use crate::filter::gradient::physical_derivatives;

impl<B: Backend, const D: usize> VectorField<B, D> {
    /// Jacobian `J[i][j] = ∂v_i/∂x_j` along the physical axes.
    pub fn jacobian(&self) -> Result<Vec<Vec<Tensor<B, D>>>> {
        self.components()
            .iter()
            .map(|component| physical_derivatives(component.clone(), self.grid()))
            .collect()
    }
}

/// Lie bracket `[v, u] = Jv·u − Ju·v`.
///
/// Exactly antisymmetric: `lie_bracket(v, u) == -lie_bracket(u, v)`.
pub fn lie_bracket<B: Backend, const D: usize>(
    v: &VectorField<B, D>,
    u: &VectorField<B, D>,
) -> Result<VectorField<B, D>> {
    v.ensure_same_grid(u)?;

    let jv = v.jacobian()?;
    let ju = u.jacobian()?;
    let vc = v.components();
    let uc = u.components();

    Ok(v.map_components(|i, _| {
        let mut acc = jv[i][0].clone() * uc[0].clone() - ju[i][0].clone() * vc[0].clone();
        for j in 1..D {
            acc = acc + jv[i][j].clone() * uc[j].clone() - ju[i][j].clone() * vc[j].clone();
        }
        acc
    }))
}
