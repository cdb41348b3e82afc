// Copyright 2026 The Cellsim Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The strategy seam between the discretiser and any concrete spatial
//! discretisation.  The discretiser never branches on which strategy is
//! active for a domain; it only calls this contract.

use std::collections::HashMap;
use std::rc::Rc;

use sprs::CsMat;

use crate::common::Result;
use crate::domain::{DomainName, MACROSCALE_DOMAINS};
use crate::model::BcMap;
use crate::symbol::{Side, Symbol};

/// Reserved registry name standing for "every primary electrochemical
/// sub-domain, uniformly".
pub const MACROSCALE: &str = "macroscale";

pub type SpatialMethodMap = HashMap<DomainName, Rc<dyn SpatialMethod>>;

/// One spatial discretisation strategy for one mesh representation.
///
/// `child` arguments are the continuous symbols (for domain and boundary
/// lookups); `disc_child` arguments are their already-rewritten
/// counterparts.
pub trait SpatialMethod {
    /// Rewrite `grad(child)` as a sparse linear operation, applying any
    /// boundary conditions registered for the child.
    fn gradient(&self, child: &Symbol, disc_child: &Symbol, bcs: &BcMap) -> Result<Symbol>;

    /// Rewrite `div(child)` as a sparse linear operation over an edge-valued
    /// child.
    fn divergence(&self, child: &Symbol, disc_child: &Symbol, bcs: &BcMap) -> Result<Symbol>;

    /// Definite integral of the child over `domain`.
    fn integral(&self, domain: &[DomainName], disc_child: &Symbol) -> Result<Symbol>;

    /// Cumulative integral of the child from the left end of `domain`,
    /// valued on cell edges.
    fn indefinite_integral(&self, domain: &[DomainName], disc_child: &Symbol)
    -> Result<Symbol>;

    /// The child's value extrapolated to one end of its domain.
    fn boundary_value(&self, child: &Symbol, disc_child: &Symbol, side: Side)
    -> Result<Symbol>;

    /// Replicate a number-valued symbol to one entry per mesh point of
    /// `domain`.
    fn broadcast(&self, symbol: &Symbol, domain: &[DomainName]) -> Result<Symbol>;

    /// The mass-matrix block for one variable, sized to its discretised
    /// length.
    fn mass_matrix(&self, variable: &Symbol, bcs: &BcMap) -> Result<CsMat<f64>>;

    /// Interpolate a cell-centred quantity onto face locations so its shape
    /// matches a discretised gradient, extrapolating to whichever boundary
    /// faces the flags request.
    fn compute_diffusivity(
        &self,
        disc_symbol: &Symbol,
        extrapolate_left: bool,
        extrapolate_right: bool,
    ) -> Result<Symbol>;

    /// The discretised spatial coordinate over the symbol's domain.
    fn spatial_variable(&self, symbol: &Symbol) -> Result<Symbol>;
}

/// Expand the reserved `"macroscale"` entry to one entry per primary
/// sub-domain.  Explicit per-domain entries win over the expansion.
pub fn expand_macroscale(methods: SpatialMethodMap) -> SpatialMethodMap {
    let mut expanded: SpatialMethodMap = HashMap::new();
    if let Some(method) = methods.get(MACROSCALE) {
        for dom in MACROSCALE_DOMAINS {
            expanded.insert(dom.to_owned(), Rc::clone(method));
        }
    }
    for (dom, method) in methods {
        if dom != MACROSCALE {
            expanded.insert(dom, method);
        }
    }
    expanded
}
