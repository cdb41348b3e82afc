// Copyright 2026 The Cellsim Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Finite-volume discretisation over 1-D cell-centred submeshes.
//!
//! Fields live on cell centres; gradients live on cell faces.  A Dirichlet
//! boundary condition is applied through a ghost node mirrored across the
//! boundary edge (`y -> [2*a - y_0, y, 2*b - y_{n-1}]`), which extends the
//! gradient to the boundary faces.  A Neumann condition fixes the flux at a
//! boundary face directly.

use std::rc::Rc;

use sprs::CsMat;

use crate::common::Result;
use crate::domain::DomainName;
use crate::mesh::{Mesh, SubMesh};
use crate::model::{BcKind, BcMap, BoundaryCondition};
use crate::sparse;
use crate::spatial::SpatialMethod;
use crate::symbol::{Side, Symbol};

pub struct FiniteVolume {
    mesh: Rc<Mesh>,
}

impl FiniteVolume {
    pub fn new(mesh: Rc<Mesh>) -> FiniteVolume {
        FiniteVolume { mesh }
    }

    /// Two-point difference from node values to the faces between them:
    /// a `(len - 1) x len` operator.
    fn gradient_matrix(nodes: &[f64]) -> CsMat<f64> {
        let n = nodes.len();
        sparse::from_triplets(
            n - 1,
            n,
            (0..n - 1).flat_map(|i| {
                let d = nodes[i + 1] - nodes[i];
                [(i, i, -1.0 / d), (i, i + 1, 1.0 / d)]
            }),
        )
    }

    /// Mirror the field across each Dirichlet boundary edge:
    /// `y -> [2*a - y_0, y, 2*b - y_{n-1}]`, built as an extension matrix
    /// applied to the field plus a boundary-value vector.
    fn add_ghost_nodes(
        disc_child: &Symbol,
        npts: usize,
        left: Option<&BoundaryCondition>,
        right: Option<&BoundaryCondition>,
    ) -> Result<Symbol> {
        let dl = left.is_some() as usize;
        let dr = right.is_some() as usize;
        let rows = npts + dl + dr;

        let mut triplets = Vec::with_capacity(rows);
        if left.is_some() {
            triplets.push((0, 0, -1.0));
        }
        for i in 0..npts {
            triplets.push((dl + i, i, 1.0));
        }
        if right.is_some() {
            triplets.push((rows - 1, npts - 1, -1.0));
        }
        let extension = sparse::from_triplets(rows, npts, triplets);

        let mut parts = Vec::with_capacity(3);
        if let Some(bc) = left {
            parts.push(Symbol::mul(Symbol::scalar(2.0), bc.value.clone())?);
        }
        parts.push(Symbol::vector(vec![0.0; npts]));
        if let Some(bc) = right {
            parts.push(Symbol::mul(Symbol::scalar(2.0), bc.value.clone())?);
        }

        Symbol::add(
            Symbol::matmul(Symbol::matrix(extension), disc_child.clone())?,
            Symbol::flat_concatenation(parts),
        )
    }

    fn combined(&self, domain: &[DomainName]) -> Result<SubMesh> {
        self.mesh.combine_submeshes(domain)
    }
}

impl SpatialMethod for FiniteVolume {
    fn gradient(&self, child: &Symbol, disc_child: &Symbol, bcs: &BcMap) -> Result<Symbol> {
        let submesh = self.combined(child.domain())?;
        let n = submesh.npts;

        let bc = bcs.get(&child.id());
        let left = bc.and_then(|bc| bc.left.as_ref());
        let right = bc.and_then(|bc| bc.right.as_ref());

        let ghost_left = matches!(left, Some(bc) if bc.kind == BcKind::Dirichlet);
        let ghost_right = matches!(right, Some(bc) if bc.kind == BcKind::Dirichlet);

        let mut nodes = submesh.nodes.clone();
        let mut field = disc_child.clone();
        if ghost_left || ghost_right {
            field = FiniteVolume::add_ghost_nodes(
                disc_child,
                n,
                left.filter(|bc| bc.kind == BcKind::Dirichlet),
                right.filter(|bc| bc.kind == BcKind::Dirichlet),
            )?;
            if ghost_left {
                nodes.insert(0, 2.0 * submesh.edges[0] - submesh.nodes[0]);
            }
            if ghost_right {
                nodes.push(2.0 * submesh.edges[n] - submesh.nodes[n - 1]);
            }
        }

        let mut out = Symbol::matmul(
            Symbol::matrix(FiniteVolume::gradient_matrix(&nodes)),
            field,
        )?;

        // a Neumann condition is the flux itself: place it on the boundary face
        let left_flux = left.filter(|bc| bc.kind == BcKind::Neumann);
        let right_flux = right.filter(|bc| bc.kind == BcKind::Neumann);
        if left_flux.is_some() || right_flux.is_some() {
            let mut parts = Vec::with_capacity(3);
            if let Some(bc) = left_flux {
                parts.push(bc.value.clone());
            }
            parts.push(out);
            if let Some(bc) = right_flux {
                parts.push(bc.value.clone());
            }
            out = Symbol::flat_concatenation(parts);
        }

        Ok(out.with_ghost_cells(left.is_some(), right.is_some()))
    }

    fn divergence(&self, child: &Symbol, disc_child: &Symbol, _bcs: &BcMap) -> Result<Symbol> {
        let submesh = self.combined(child.domain())?;
        let n = submesh.npts;
        let widths = submesh.d_edges();
        let matrix = sparse::from_triplets(
            n,
            n + 1,
            (0..n).flat_map(|i| [(i, i, -1.0 / widths[i]), (i, i + 1, 1.0 / widths[i])]),
        );
        Symbol::matmul(Symbol::matrix(matrix), disc_child.clone())
    }

    fn integral(&self, domain: &[DomainName], disc_child: &Symbol) -> Result<Symbol> {
        let submesh = self.combined(domain)?;
        let weights = sparse::row_vector(&submesh.d_edges());
        let out = Symbol::matmul(Symbol::matrix(weights), disc_child.clone())?;
        Ok(out.replace_domain(vec![]))
    }

    fn indefinite_integral(
        &self,
        domain: &[DomainName],
        disc_child: &Symbol,
    ) -> Result<Symbol> {
        let submesh = self.combined(domain)?;
        let n = submesh.npts;
        let widths = submesh.d_edges();
        // edge j carries the running total of the first j cells; the first
        // row is empty so the integral is zero at the left end
        let mut triplets = Vec::with_capacity(n * (n + 1) / 2);
        for j in 1..=n {
            for i in 0..j {
                triplets.push((j, i, widths[i]));
            }
        }
        let matrix = sparse::from_triplets(n + 1, n, triplets);
        Symbol::matmul(Symbol::matrix(matrix), disc_child.clone())
    }

    fn boundary_value(
        &self,
        child: &Symbol,
        disc_child: &Symbol,
        side: Side,
    ) -> Result<Symbol> {
        let submesh = self.combined(child.domain())?;
        let n = submesh.npts;
        let triplets: Vec<(usize, usize, f64)> = if n == 1 {
            vec![(0, 0, 1.0)]
        } else {
            match side {
                Side::Left => vec![(0, 0, 1.5), (0, 1, -0.5)],
                Side::Right => vec![(0, n - 2, -0.5), (0, n - 1, 1.5)],
            }
        };
        let row = sparse::from_triplets(1, n, triplets);
        let out = Symbol::matmul(Symbol::matrix(row), disc_child.clone())?;
        Ok(out.replace_domain(vec![]))
    }

    fn broadcast(&self, symbol: &Symbol, domain: &[DomainName]) -> Result<Symbol> {
        if symbol.domain() == domain {
            return Ok(symbol.clone());
        }
        let npts = self.mesh.npts_for_broadcast(domain)?;
        let ones = Symbol::vector_with_domain(vec![1.0; npts], domain)?;
        Symbol::mul(symbol.clone(), ones)
    }

    fn mass_matrix(&self, variable: &Symbol, _bcs: &BcMap) -> Result<CsMat<f64>> {
        let npts = self.mesh.npts_for_broadcast(variable.domain())?;
        Ok(sparse::eye(npts))
    }

    fn compute_diffusivity(
        &self,
        disc_symbol: &Symbol,
        extrapolate_left: bool,
        extrapolate_right: bool,
    ) -> Result<Symbol> {
        // a plain number broadcasts against any face vector unchanged
        if disc_symbol.domain().is_empty() {
            return Ok(disc_symbol.clone());
        }
        let submesh = self.combined(disc_symbol.domain())?;
        let n = submesh.npts;
        let el = extrapolate_left as usize;
        let er = extrapolate_right as usize;
        let rows = (n - 1) + el + er;

        let mut triplets: Vec<(usize, usize, f64)> = Vec::with_capacity(2 * rows);
        if extrapolate_left {
            if n == 1 {
                triplets.push((0, 0, 1.0));
            } else {
                triplets.push((0, 0, 1.5));
                triplets.push((0, 1, -0.5));
            }
        }
        for i in 0..n - 1 {
            triplets.push((el + i, i, 0.5));
            triplets.push((el + i, i + 1, 0.5));
        }
        if extrapolate_right {
            if n == 1 {
                triplets.push((rows - 1, 0, 1.0));
            } else {
                triplets.push((rows - 1, n - 2, -0.5));
                triplets.push((rows - 1, n - 1, 1.5));
            }
        }
        let averaging = sparse::from_triplets(rows, n, triplets);
        Symbol::matmul(Symbol::matrix(averaging), disc_symbol.clone())
    }

    fn spatial_variable(&self, symbol: &Symbol) -> Result<Symbol> {
        let submesh = self.combined(symbol.domain())?;
        Symbol::vector_with_domain(submesh.nodes, symbol.domain())
    }
}
