//! Baker–Campbell–Hausdorff composition of velocity fields.
//!
//! Two truncations are provided:
//!
//! - [`BchComposer`] sums the leading terms of the series for `exp(v)·exp(u)`
//!   and is used to accumulate small updates into a running velocity.
//! - [`SchildsLadderBch`] evaluates `u + [v,u] + ½[v,[v,u]]`, the second-order
//!   operator behind Schild's-ladder transport.

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use svf_core::{lie_bracket, VectorField};
use crate::error::{RegistrationError, Result};

/// Truncation of the ladder operator. Only the 5-term, second-order form exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApproximationOrder {
    /// `u + [v,u] + ½[v,[v,u]]`
    SecondOrder,
}

impl ApproximationOrder {
    /// Map a number of series terms to an order.
    pub fn from_terms(terms: usize) -> Result<Self> {
        match terms {
            5 => Ok(Self::SecondOrder),
            _ => Err(RegistrationError::UnsupportedApproximationOrder { terms }),
        }
    }

    pub fn terms(&self) -> usize {
        match self {
            Self::SecondOrder => 5,
        }
    }
}

/// Whether the ladder operator uses `v` or `v/2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BchMode {
    #[default]
    Plain,
    /// Half-step used by Schild's ladder: `v` is replaced by `v/2`.
    Transport,
}

/// Second-order ladder operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchildsLadderBch {
    order: ApproximationOrder,
    mode: BchMode,
}

impl SchildsLadderBch {
    pub fn new(order: ApproximationOrder, mode: BchMode) -> Self {
        Self { order, mode }
    }

    /// Build from a term count; anything but 5 is rejected.
    pub fn from_terms(terms: usize, mode: BchMode) -> Result<Self> {
        Ok(Self::new(ApproximationOrder::from_terms(terms)?, mode))
    }

    pub fn order(&self) -> ApproximationOrder {
        self.order
    }

    pub fn mode(&self) -> BchMode {
        self.mode
    }

    /// Apply the operator with `left` in the role of `u` and `right` as `v`.
    ///
    /// `left` is consumed; its storage becomes the result.
    pub fn compose<B: Backend, const D: usize>(
        &self,
        left: VectorField<B, D>,
        right: &VectorField<B, D>,
    ) -> Result<VectorField<B, D>> {
        left.ensure_same_grid(right)?;

        let scaled;
        let v = match self.mode {
            BchMode::Plain => right,
            BchMode::Transport => {
                scaled = right.scale(0.5);
                &scaled
            }
        };

        let b1 = lie_bracket(v, &left)?;
        let b2 = lie_bracket(v, &b1)?;
        tracing::trace!(mode = ?self.mode, "ladder composition");

        Ok(VectorField::sum(&[left, b1, b2.scale(0.5)])?)
    }
}

/// Truncated BCH series for accumulating an update `u` into a velocity `v`.
///
/// | terms | result |
/// |-------|--------|
/// | 2 | `v + u` |
/// | 3 | `v + u + ½[v,u]` |
/// | 4 | `v + u + ½[v,u] + 1/12 [v,[v,u]]` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BchComposer {
    terms: usize,
}

impl Default for BchComposer {
    fn default() -> Self {
        Self { terms: 2 }
    }
}

impl BchComposer {
    pub fn new(terms: usize) -> Result<Self> {
        match terms {
            2..=4 => Ok(Self { terms }),
            _ => Err(RegistrationError::UnsupportedApproximationOrder { terms }),
        }
    }

    pub fn terms(&self) -> usize {
        self.terms
    }

    /// Velocity of `exp(v) ∘ exp(u)` to the configured order.
    pub fn compose<B: Backend, const D: usize>(
        &self,
        velocity: &VectorField<B, D>,
        update: &VectorField<B, D>,
    ) -> Result<VectorField<B, D>> {
        let mut result = velocity.add(update)?;
        if self.terms >= 3 {
            let bracket = lie_bracket(velocity, update)?;
            result = result.add(&bracket.scale(0.5))?;
            if self.terms >= 4 {
                let nested = lie_bracket(velocity, &bracket)?;
                result = result.add(&nested.scale(1.0 / 12.0))?;
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Shape, Tensor, TensorData};
    use burn_ndarray::NdArray;
    use svf_core::Grid;

    type Backend = NdArray<f32>;

    fn field(grid: &Grid<2>, f: impl Fn(f64, f64) -> (f64, f64)) -> VectorField<Backend, 2> {
        let device = Default::default();
        let [ny, nx] = grid.size();
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for y in 0..ny {
            for x in 0..nx {
                let (a, b) = f(x as f64, y as f64);
                xs.push(a as f32);
                ys.push(b as f32);
            }
        }
        VectorField::from_components(
            grid.clone(),
            vec![
                Tensor::from_data(TensorData::new(xs, Shape::new([ny, nx])), &device),
                Tensor::from_data(TensorData::new(ys, Shape::new([ny, nx])), &device),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_order_guard() {
        assert_eq!(ApproximationOrder::from_terms(5).unwrap().terms(), 5);
        for terms in [0, 2, 3, 4, 6] {
            assert!(matches!(
                SchildsLadderBch::from_terms(terms, BchMode::Plain),
                Err(RegistrationError::UnsupportedApproximationOrder { terms: t }) if t == terms
            ));
        }
        assert!(BchComposer::new(1).is_err());
        assert!(BchComposer::new(5).is_err());
        assert!(BchComposer::new(3).is_ok());
    }

    #[test]
    fn test_ladder_identity_element() {
        let device = Default::default();
        let grid = Grid::<2>::with_size([8, 9]);
        let u = field(&grid, |x, y| (0.1 * x * y, (x - y).sin()));
        let zero = VectorField::zeros(&grid, &device);

        for mode in [BchMode::Plain, BchMode::Transport] {
            let bch = SchildsLadderBch::new(ApproximationOrder::SecondOrder, mode);
            let result = bch.compose(u.clone(), &zero).unwrap();
            assert!(result.rms_difference(&u).unwrap() < 1e-6);
        }
    }

    #[test]
    fn test_ladder_linear_fields() {
        // v = (y, 0), u = (0, 1): [v,u] = (1, 0), [v,[v,u]] = 0.
        let grid = Grid::<2>::with_size([6, 6]);
        let v = field(&grid, |_, y| (y, 0.0));
        let u = field(&grid, |_, _| (0.0, 1.0));

        let plain = SchildsLadderBch::new(ApproximationOrder::SecondOrder, BchMode::Plain)
            .compose(u.clone(), &v)
            .unwrap();
        let expected = field(&grid, |_, _| (1.0, 1.0));
        assert!(plain.rms_difference(&expected).unwrap() < 1e-5);

        let transport = SchildsLadderBch::new(ApproximationOrder::SecondOrder, BchMode::Transport)
            .compose(u, &v)
            .unwrap();
        let expected = field(&grid, |_, _| (0.5, 1.0));
        assert!(transport.rms_difference(&expected).unwrap() < 1e-5);
    }

    #[test]
    fn test_composer_terms() {
        let device = Default::default();
        let grid = Grid::<2>::with_size([6, 6]);
        let v = field(&grid, |_, y| (y, 0.0));
        let u = field(&grid, |_, _| (0.0, 1.0));

        let two = BchComposer::new(2).unwrap().compose(&v, &u).unwrap();
        assert!(two.rms_difference(&v.add(&u).unwrap()).unwrap() < 1e-6);

        let three = BchComposer::new(3).unwrap().compose(&v, &u).unwrap();
        let expected = field(&grid, |_, y| (y + 0.5, 1.0));
        assert!(three.rms_difference(&expected).unwrap() < 1e-5);

        let zero = VectorField::zeros(&grid, &device);
        for terms in 2..=4 {
            let composer = BchComposer::new(terms).unwrap();
            let identity = composer.compose(&v, &zero).unwrap();
            assert!(identity.rms_difference(&v).unwrap() < 1e-6);
        }
    }
}
