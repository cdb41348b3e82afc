// Copyright 2026 The Cellsim Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The model bundle a caller authors and the discretised bundle the compiler
//! pass produces.
//!
//! A `Model` is immutable input: discretisation consumes it by reference and
//! returns a fresh `DiscretisedModel` value, so a caller can never observe a
//! half-discretised model.  Entries are ordered pairs rather than maps; the
//! order equations are supplied in is the order state is laid out in.

use std::collections::HashMap;
use std::fmt;

use sprs::CsMat;

use crate::discretise::SliceMap;
use crate::symbol::{Side, Symbol, SymbolId};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BcKind {
    /// Fixed value at the boundary, applied through ghost nodes.
    Dirichlet,
    /// Fixed flux at the boundary edge.
    Neumann,
}

impl fmt::Display for BcKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BcKind::Dirichlet => write!(f, "Dirichlet"),
            BcKind::Neumann => write!(f, "Neumann"),
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct BoundaryCondition {
    pub value: Symbol,
    pub kind: BcKind,
}

/// Boundary conditions for one variable, per side.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct BoundaryConditions {
    pub left: Option<BoundaryCondition>,
    pub right: Option<BoundaryCondition>,
}

impl BoundaryConditions {
    pub fn new() -> BoundaryConditions {
        Default::default()
    }

    pub fn set(&mut self, side: Side, value: Symbol, kind: BcKind) {
        let bc = BoundaryCondition { value, kind };
        match side {
            Side::Left => self.left = Some(bc),
            Side::Right => self.right = Some(bc),
        }
    }

    pub fn get(&self, side: Side) -> Option<&BoundaryCondition> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }
}

/// Discretised boundary conditions keyed by variable identity (not name, to
/// avoid aliasing distinct variables that share a name).
pub type BcMap = HashMap<SymbolId, BoundaryConditions>;

/// A continuous model: differential equations (`rhs`), algebraic
/// constraints, boundary and initial conditions, named output expressions
/// and termination events.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Model {
    /// `d(variable)/dt = equation`, in state-layout order.
    pub rhs: Vec<(Symbol, Symbol)>,
    /// `0 = equation`, keyed by the variable each constraint determines.
    pub algebraic: Vec<(Symbol, Symbol)>,
    pub initial_conditions: Vec<(Symbol, Symbol)>,
    pub boundary_conditions: Vec<(Symbol, BoundaryConditions)>,
    /// Named outputs; free to read any symbol, not required to be state.
    pub variables: Vec<(String, Symbol)>,
    pub events: Vec<Symbol>,
}

impl Model {
    pub fn new() -> Model {
        Default::default()
    }
}

/// The discretised counterpart: every spatial operator replaced by a sparse
/// operation, every variable replaced by a state-vector slice, plus the
/// assembled pieces an integrator consumes.
#[derive(Clone, PartialEq, Debug)]
pub struct DiscretisedModel {
    pub rhs: Vec<(Symbol, Symbol)>,
    pub algebraic: Vec<(Symbol, Symbol)>,
    pub initial_conditions: Vec<(Symbol, Symbol)>,
    pub boundary_conditions: BcMap,
    pub variables: Vec<(String, Symbol)>,
    pub events: Vec<Symbol>,

    pub concatenated_rhs: Symbol,
    pub concatenated_algebraic: Symbol,
    /// Fully numeric by construction; initial conditions must not depend on
    /// the state they define.
    pub concatenated_initial_conditions: Vec<f64>,
    pub concatenated_events: Symbol,
    /// Block-diagonal, one block per rhs variable in slice order, plus a
    /// zero block for the algebraic equations.
    pub mass_matrix: CsMat<f64>,
    pub y_slices: SliceMap,
}
