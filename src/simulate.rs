// Copyright 2026 The Cellsim Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The callable surface an external ODE/DAE integrator drives: right-hand
//! side, algebraic residual, full DAE residual `M·ẏ − f(t, y)`, event
//! values, the mass matrix and the initial state.
//!
//! Every call is independent: the differential and algebraic blocks of one
//! residual call share a sub-expression cache, but nothing is retained
//! between calls, so a compiled model can be evaluated concurrently at
//! different `(t, y)` points.
//!
//! No Jacobian is provided; differentiation is the integrator's concern.

use sprs::CsMat;

use crate::common::Result;
use crate::eval::Evaluator;
use crate::model::DiscretisedModel;
use crate::model_err;
use crate::sparse;
use crate::symbol::Symbol;

pub struct CompiledModel {
    rhs: Symbol,
    algebraic: Symbol,
    events: Vec<Symbol>,
    mass_matrix: CsMat<f64>,
    y0: Vec<f64>,
}

impl CompiledModel {
    pub fn new(model: &DiscretisedModel) -> CompiledModel {
        CompiledModel {
            rhs: model.concatenated_rhs.clone(),
            algebraic: model.concatenated_algebraic.clone(),
            events: model.events.clone(),
            mass_matrix: model.mass_matrix.clone(),
            y0: model.concatenated_initial_conditions.clone(),
        }
    }

    pub fn initial_conditions(&self) -> &[f64] {
        &self.y0
    }

    pub fn mass_matrix(&self) -> &CsMat<f64> {
        &self.mass_matrix
    }

    /// The differential block `f(t, y)`.
    pub fn rhs(&self, t: f64, y: &[f64]) -> Result<Vec<f64>> {
        Evaluator::new(Some(t), Some(y)).eval(&self.rhs)?.into_vector()
    }

    /// The algebraic block `g(t, y)`.
    pub fn algebraic(&self, t: f64, y: &[f64]) -> Result<Vec<f64>> {
        Evaluator::new(Some(t), Some(y))
            .eval(&self.algebraic)?
            .into_vector()
    }

    /// The DAE residual `M·ẏ − [f(t, y); g(t, y)]`.  Both blocks are
    /// evaluated against one shared sub-expression cache.
    pub fn residual(&self, t: f64, y: &[f64], ydot: &[f64]) -> Result<Vec<f64>> {
        let mut evaluator = Evaluator::new(Some(t), Some(y));
        let mut f = evaluator.eval(&self.rhs)?.into_vector()?;
        f.extend(evaluator.eval(&self.algebraic)?.into_vector()?);

        if f.len() != self.mass_matrix.rows() {
            return model_err!(
                ShapeMismatch,
                format!(
                    "residual of length {} does not match a {}x{} mass matrix",
                    f.len(),
                    self.mass_matrix.rows(),
                    self.mass_matrix.cols()
                )
            );
        }
        let m_ydot = sparse::mul_vec(&self.mass_matrix, ydot)?;
        Ok(m_ydot
            .into_iter()
            .zip(f)
            .map(|(m, f)| m - f)
            .collect())
    }

    /// Termination-event values; an integrator stops when one crosses zero.
    pub fn events(&self, t: f64, y: &[f64]) -> Result<Vec<f64>> {
        let mut evaluator = Evaluator::new(Some(t), Some(y));
        let mut out = Vec::with_capacity(self.events.len());
        for event in &self.events {
            let value = evaluator.eval(event)?.into_vector()?;
            match value.as_slice() {
                [v] => out.push(*v),
                _ => {
                    return model_err!(
                        ShapeMismatch,
                        format!(
                            "event '{event}' must evaluate to a single value, got {} entries",
                            value.len()
                        )
                    );
                }
            }
        }
        Ok(out)
    }
}
