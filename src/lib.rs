// Copyright 2026 The Cellsim Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

//! Symbolic expression trees for continuous PDE/DAE models and the
//! discretisation pass that compiles them into sparse algebraic systems an
//! ODE/DAE integrator can evaluate.
//!
//! The flow: author a [`Model`] out of [`Symbol`] trees over named spatial
//! regions, mesh those regions, register a spatial method per region, run
//! [`Discretisation::process_model`], and hand the resulting
//! [`CompiledModel`] to an integrator.

pub mod common;
pub mod discretise;
pub mod domain;
pub mod eval;
pub mod finite_volume;
pub mod mesh;
pub mod model;
pub mod simplify;
pub mod sparse;
pub mod spatial;
pub mod symbol;
pub mod value;

mod simulate;

pub use self::common::{Error, ErrorCode, ErrorKind, Ident, Result};
pub use self::discretise::{Discretisation, SliceMap};
pub use self::domain::{DomainName, KNOWN_DOMAINS};
pub use self::eval::{Evaluator, evaluate};
pub use self::finite_volume::FiniteVolume;
pub use self::mesh::{Mesh, SubMesh};
pub use self::model::{
    BcKind, BcMap, BoundaryCondition, BoundaryConditions, DiscretisedModel, Model,
};
pub use self::simplify::simplify;
pub use self::simulate::CompiledModel;
pub use self::spatial::{MACROSCALE, SpatialMethod, SpatialMethodMap};
pub use self::symbol::{BinaryOp, BuiltinFn, Side, SpatialOp, Symbol, SymbolId, SymbolKind, UnaryOp};
pub use self::value::Value;
