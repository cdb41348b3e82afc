// Copyright 2026 The Cellsim Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The discretisation pass.
//!
//! Consumes a continuous `Model`, a mesh and a spatial-method registry, and
//! produces a `DiscretisedModel`: state variables pinned to slices of one
//! flat state vector, spatial operators rewritten to sparse operations,
//! equations concatenated in a deterministic order, the block-diagonal mass
//! matrix assembled, and every shape invariant checked before an integrator
//! ever sees the model.
//!
//! Runs to completion once per model; any error aborts the whole pass and no
//! partially discretised model is returned.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::rc::Rc;

use log::debug;
use sprs::CsMat;

use crate::common::Result;
use crate::eval::evaluate;
use crate::mesh::Mesh;
use crate::model::{
    BcMap, BoundaryCondition, BoundaryConditions, DiscretisedModel, Model,
};
use crate::sparse;
use crate::spatial::{SpatialMethod, SpatialMethodMap, expand_macroscale};
use crate::symbol::{BinaryOp, SpatialOp, Symbol, SymbolId, SymbolKind};
use crate::value::Value;
use crate::{domain_err, model_err};

/// Assignment of each state variable to a contiguous half-open range of the
/// flat state vector.  Ranges are non-overlapping and cover exactly
/// `[0, total_size)`, in the order variables were supplied.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct SliceMap {
    order: Vec<(SymbolId, Range<usize>)>,
    by_id: HashMap<SymbolId, Range<usize>>,
    total_size: usize,
}

impl SliceMap {
    fn insert(&mut self, id: SymbolId, slice: Range<usize>) {
        self.total_size = self.total_size.max(slice.end);
        self.by_id.insert(id, slice.clone());
        self.order.push((id, slice));
    }

    pub fn get(&self, id: SymbolId) -> Option<Range<usize>> {
        self.by_id.get(&id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(SymbolId, Range<usize>)> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn ids(&self) -> HashSet<SymbolId> {
        self.by_id.keys().copied().collect()
    }
}

pub struct Discretisation {
    mesh: Rc<Mesh>,
    spatial_methods: SpatialMethodMap,
    bcs: BcMap,
    y_slices: SliceMap,
}

impl Discretisation {
    pub fn new(mesh: Rc<Mesh>, spatial_methods: SpatialMethodMap) -> Discretisation {
        Discretisation {
            mesh,
            spatial_methods: expand_macroscale(spatial_methods),
            bcs: HashMap::new(),
            y_slices: SliceMap::default(),
        }
    }

    pub fn mesh(&self) -> &Rc<Mesh> {
        &self.mesh
    }

    pub fn y_slices(&self) -> &SliceMap {
        &self.y_slices
    }

    /// Discretise a whole model.  The input is untouched; the returned model
    /// is complete or the pass fails.
    pub fn process_model(&mut self, model: &Model) -> Result<DiscretisedModel> {
        debug!(
            "discretising model: {} rhs, {} algebraic, {} events",
            model.rhs.len(),
            model.algebraic.len(),
            model.events.len()
        );

        // slice assignment covers rhs variables then algebraic variables, in
        // the order the caller supplied them
        let variables: Vec<Symbol> = model
            .rhs
            .iter()
            .chain(model.algebraic.iter())
            .map(|(var, _)| var.clone())
            .collect();
        self.set_variable_slices(&variables)?;

        self.process_boundary_conditions(&model.boundary_conditions)?;

        let initial_conditions = self.process_equations(&model.initial_conditions)?;
        let concatenated_initial_conditions = self.concatenate_init(&initial_conditions)?;
        debug!(
            "initial state vector has {} entries",
            concatenated_initial_conditions.len()
        );

        let rhs = self.process_equations(&model.rhs)?;
        let concatenated_rhs =
            Symbol::flat_concatenation(rhs.iter().map(|(_, eqn)| eqn.clone()).collect());

        let algebraic = self.process_equations(&model.algebraic)?;
        let concatenated_algebraic =
            Symbol::flat_concatenation(algebraic.iter().map(|(_, eqn)| eqn.clone()).collect());

        // outputs and events may read any discretised symbol without being
        // part of the state themselves
        let variables = model
            .variables
            .iter()
            .map(|(name, eqn)| Ok((name.clone(), self.process_symbol(eqn)?)))
            .collect::<Result<Vec<_>>>()?;
        let events = model
            .events
            .iter()
            .map(|event| self.process_symbol(event))
            .collect::<Result<Vec<_>>>()?;
        let concatenated_events = Symbol::flat_concatenation(events.clone());

        let mass_matrix = self.create_mass_matrix(
            &rhs,
            !algebraic.is_empty(),
            &concatenated_algebraic,
            &concatenated_initial_conditions,
        )?;

        let discretised = DiscretisedModel {
            rhs,
            algebraic,
            initial_conditions,
            boundary_conditions: self.bcs.clone(),
            variables,
            events,
            concatenated_rhs,
            concatenated_algebraic,
            concatenated_initial_conditions,
            concatenated_events,
            mass_matrix,
            y_slices: self.y_slices.clone(),
        };
        self.check_model(&discretised)?;
        Ok(discretised)
    }

    /// Assign each variable its slice of the flat state vector, unpacking
    /// variables hidden inside concatenations.  A domain-independent
    /// variable takes one slot; a domain variable takes one slot per mesh
    /// point across every submesh of every region it spans.
    pub fn set_variable_slices(&mut self, variables: &[Symbol]) -> Result<()> {
        let mut unpacked: Vec<Symbol> = Vec::with_capacity(variables.len());
        for symbol in variables {
            if let SymbolKind::Concatenation(children) = symbol.kind() {
                unpacked.extend(children.iter().map(|c| c.as_ref().clone()));
            } else {
                unpacked.push(symbol.clone());
            }
        }

        let mut y_slices = SliceMap::default();
        let mut start = 0;
        let mut end = 0;
        for variable in &unpacked {
            if variable.domain().is_empty() {
                end += 1;
            } else {
                for dom in variable.domain() {
                    for submesh in self.mesh.get(dom)? {
                        end += submesh.npts_for_broadcast;
                    }
                }
            }
            y_slices.insert(variable.id(), start..end);
            start = end;
        }
        debug!(
            "assigned {} state entries across {} variables",
            end,
            y_slices.len()
        );
        self.y_slices = y_slices;
        Ok(())
    }

    /// Discretise boundary-condition values and key them by variable
    /// identity (not name, so distinct variables sharing a name never
    /// alias), independent of slice assignment.
    pub fn process_boundary_conditions(
        &mut self,
        boundary_conditions: &[(Symbol, BoundaryConditions)],
    ) -> Result<()> {
        self.bcs = HashMap::new();
        for (var, conditions) in boundary_conditions {
            let mut out = BoundaryConditions::new();
            if let Some(bc) = &conditions.left {
                out.left = Some(BoundaryCondition {
                    value: self.process_symbol(&bc.value)?,
                    kind: bc.kind,
                });
            }
            if let Some(bc) = &conditions.right {
                out.right = Some(BoundaryCondition {
                    value: self.process_symbol(&bc.value)?,
                    kind: bc.kind,
                });
            }
            self.bcs.insert(var.id(), out);
        }
        Ok(())
    }

    /// Discretise `{variable: equation}` pairs, broadcasting number-valued
    /// equations over their key's domain first.
    fn process_equations(&self, pairs: &[(Symbol, Symbol)]) -> Result<Vec<(Symbol, Symbol)>> {
        pairs
            .iter()
            .map(|(key, eqn)| {
                let eqn = if eqn.evaluates_to_number() {
                    if key.domain().is_empty() {
                        Symbol::repeat(eqn.clone(), 1, &[])
                    } else {
                        self.spatial_method(&key.domain()[0])?
                            .broadcast(eqn, key.domain())?
                    }
                } else {
                    eqn.clone()
                };
                Ok((key.clone(), self.process_symbol(&eqn)?))
            })
            .collect()
    }

    /// Rewrite one expression tree: spatial operators become sparse
    /// operations via the strategy registered for the operand's domain,
    /// variables become state-vector slices, concatenations become
    /// domain-aware concatenations, and everything else is rebuilt around
    /// its rewritten children.
    pub fn process_symbol(&self, symbol: &Symbol) -> Result<Symbol> {
        match symbol.kind() {
            SymbolKind::Spatial(op, child) => {
                let disc_child = self.process_symbol(child)?;
                let method = self.spatial_method_for(child)?;
                match op {
                    SpatialOp::Gradient => method.gradient(child, &disc_child, &self.bcs),
                    SpatialOp::Divergence => method.divergence(child, &disc_child, &self.bcs),
                    SpatialOp::Integral => method.integral(child.domain(), &disc_child),
                    SpatialOp::IndefiniteIntegral => {
                        method.indefinite_integral(child.domain(), &disc_child)
                    }
                }
            }
            SymbolKind::BoundaryValue(side, child) => {
                let disc_child = self.process_symbol(child)?;
                self.spatial_method_for(child)?
                    .boundary_value(child, &disc_child, *side)
            }
            SymbolKind::Broadcast(child) => {
                let new_child = self.process_symbol(child)?;
                if symbol.domain().is_empty() {
                    Ok(Symbol::repeat(new_child, 1, &[]))
                } else {
                    self.spatial_method(&symbol.domain()[0])?
                        .broadcast(&new_child, symbol.domain())
                }
            }
            SymbolKind::Binary(op, left, right) => {
                self.process_binary(symbol, *op, left, right)
            }
            SymbolKind::Variable(name) => {
                let slice = match self.y_slices.get(symbol.id()) {
                    Some(slice) => slice,
                    None => panic!(
                        "variable '{name}' is missing from the slice map; it was never \
                         passed to set_variable_slices"
                    ),
                };
                Ok(Symbol::state_vector_with_domain(slice, symbol.domain()))
            }
            SymbolKind::SpatialVariable(_) => {
                self.spatial_method_for(symbol)?.spatial_variable(symbol)
            }
            SymbolKind::Concatenation(children) => {
                let new_children = children
                    .iter()
                    .map(|child| self.process_symbol(child))
                    .collect::<Result<Vec<_>>>()?;
                Symbol::domain_concatenation(new_children, &self.mesh)
            }
            _ => {
                let children = symbol
                    .children()
                    .iter()
                    .map(|child| self.process_symbol(child))
                    .collect::<Result<Vec<_>>>()?;
                Ok(symbol.rebuild(children))
            }
        }
    }

    /// Discretise a binary operator.  When exactly one side applies a
    /// gradient (not consumed by a divergence), the other side is a
    /// cell-centred quantity multiplying a face-valued one: interpolate it
    /// onto faces, extrapolating to whichever boundary faces the gradient
    /// side reached via its boundary conditions.
    fn process_binary(
        &self,
        parent: &Symbol,
        op: BinaryOp,
        left: &Symbol,
        right: &Symbol,
    ) -> Result<Symbol> {
        let left_grad = left.has_gradient_and_not_divergence();
        let right_grad = right.has_gradient_and_not_divergence();
        let mut new_left = self.process_symbol(left)?;
        let mut new_right = self.process_symbol(right)?;

        if left_grad != right_grad {
            let method = self.spatial_method_for(parent)?;
            if left_grad {
                let (el, er) = ghost_flags(&new_left);
                new_right = method.compute_diffusivity(&new_right, el, er)?;
            } else {
                let (el, er) = ghost_flags(&new_right);
                new_left = method.compute_diffusivity(&new_left, el, er)?;
            }
        }
        Symbol::binary(op, new_left, new_right)
    }

    /// Order the discretised initial conditions by slice, concatenate, and
    /// evaluate at `t = 0` with no state: initial conditions must resolve to
    /// numbers without the state they are defining.
    fn concatenate_init(&self, pairs: &[(Symbol, Symbol)]) -> Result<Vec<f64>> {
        let mut supplied: HashSet<SymbolId> = HashSet::new();
        for (key, _) in pairs {
            if let SymbolKind::Concatenation(children) = key.kind() {
                supplied.extend(children.iter().map(|c| c.id()));
            } else {
                supplied.insert(key.id());
            }
        }
        if supplied != self.y_slices.ids() {
            let given: Vec<String> = pairs
                .iter()
                .map(|(key, _)| match key.name() {
                    Some(name) => name.to_owned(),
                    None => format!("{key}"),
                })
                .collect();
            return model_err!(
                InsufficientInitialConditions,
                format!("initial conditions are insufficient, only provided for {given:?}")
            );
        }

        // sort equations by where their variable lives in the state vector
        let mut ordered: Vec<(usize, &Symbol)> = pairs
            .iter()
            .map(|(key, eqn)| {
                let first = match key.kind() {
                    SymbolKind::Concatenation(children) => children[0].id(),
                    _ => key.id(),
                };
                // the id was checked against the slice map above
                (self.y_slices.get(first).unwrap().start, eqn)
            })
            .collect();
        ordered.sort_by_key(|(start, _)| *start);

        let concatenated =
            Symbol::flat_concatenation(ordered.into_iter().map(|(_, eqn)| eqn.clone()).collect());
        evaluate(&concatenated, Some(0.0), None)?.into_vector()
    }

    /// One mass block per rhs variable in slice order (an identity scalar
    /// for domain-independent variables), plus a zero block covering the
    /// algebraic equations.
    fn create_mass_matrix(
        &self,
        rhs: &[(Symbol, Symbol)],
        has_algebraic: bool,
        concatenated_algebraic: &Symbol,
        y0: &[f64],
    ) -> Result<CsMat<f64>> {
        let mut blocks: Vec<CsMat<f64>> = Vec::with_capacity(rhs.len() + 1);
        for (var, _) in rhs {
            if var.domain().is_empty() {
                blocks.push(sparse::eye(1));
            } else {
                blocks.push(
                    self.spatial_method(&var.domain()[0])?
                        .mass_matrix(var, &self.bcs)?,
                );
            }
        }
        if has_algebraic {
            let n = evaluate(concatenated_algebraic, Some(0.0), Some(y0))?
                .into_vector()?
                .len();
            blocks.push(sparse::zeros(n, n));
        }
        Ok(sparse::block_diag(&blocks))
    }

    /// Shape validation: every invariant an integrator relies on is checked
    /// here, before any integration step runs.
    fn check_model(&self, model: &DiscretisedModel) -> Result<()> {
        // initial conditions must be concrete numeric vectors
        for (var, eqn) in &model.initial_conditions {
            match evaluate(eqn, Some(0.0), None)? {
                Value::Vector(_) => {}
                other => {
                    return model_err!(
                        NonNumericInitialConditions,
                        format!(
                            "initial conditions must be a numeric vector after \
                             discretisation, but they are {} for variable '{var}'",
                            other.shape()
                        )
                    );
                }
            }
        }

        let y0 = &model.concatenated_initial_conditions;

        // each rhs must match its initial condition, entry for entry
        for (var, eqn) in &model.rhs {
            let ic = model
                .initial_conditions
                .iter()
                .find(|(key, _)| key.id() == var.id());
            let ic = match ic {
                Some((_, ic)) => ic,
                None => {
                    return model_err!(
                        InsufficientInitialConditions,
                        format!("no initial condition for variable '{var}'")
                    );
                }
            };
            let rhs_len = evaluate(eqn, Some(0.0), Some(y0))?.len();
            let ic_len = evaluate(ic, Some(0.0), None)?.len();
            if rhs_len != ic_len {
                return model_err!(
                    ShapeMismatch,
                    format!(
                        "rhs and initial_conditions must have the same shape after \
                         discretisation, but rhs.shape = ({rhs_len},) and \
                         initial_conditions.shape = ({ic_len},) for variable '{var}'"
                    )
                );
            }
        }

        // differential and algebraic blocks together span the state exactly
        let rhs_len = evaluate(&model.concatenated_rhs, Some(0.0), Some(y0))?.len();
        let alg_len = evaluate(&model.concatenated_algebraic, Some(0.0), Some(y0))?.len();
        if rhs_len + alg_len != y0.len() {
            return model_err!(
                ShapeMismatch,
                format!(
                    "concatenation of (rhs, algebraic) and initial_conditions must have \
                     the same shape after discretisation, but rhs.shape = ({rhs_len},), \
                     algebraic.shape = ({alg_len},) and initial_conditions.shape = \
                     ({},)",
                    y0.len()
                )
            );
        }

        // a declared output that names a state variable must agree with its
        // equation in shape, unless the output is a plain replication
        for (var, eqn) in &model.rhs {
            let name = match var.name() {
                Some(name) => name,
                None => continue,
            };
            if let Some((_, output)) = model.variables.iter().find(|(n, _)| n == name) {
                if matches!(output.kind(), SymbolKind::Repeat(_, _)) {
                    continue;
                }
                let out_len = evaluate(output, Some(0.0), Some(y0))?.len();
                let rhs_len = evaluate(eqn, Some(0.0), Some(y0))?.len();
                if out_len != rhs_len {
                    return model_err!(
                        ShapeMismatch,
                        format!(
                            "a variable and its equation must have the same shape after \
                             discretisation, but variable.shape = ({out_len},) and \
                             rhs.shape = ({rhs_len},) for variable '{name}'"
                        )
                    );
                }
            }
        }

        Ok(())
    }

    fn spatial_method(&self, domain: &str) -> Result<&Rc<dyn SpatialMethod>> {
        match self.spatial_methods.get(domain) {
            Some(method) => Ok(method),
            None => domain_err!(
                UnknownDomain,
                format!("no spatial method registered for domain '{domain}'")
            ),
        }
    }

    fn spatial_method_for(&self, symbol: &Symbol) -> Result<&Rc<dyn SpatialMethod>> {
        match symbol.domain().first() {
            Some(dom) => self.spatial_method(dom),
            None => domain_err!(
                EmptyDomain,
                format!("'{symbol}' has no domain to discretise over")
            ),
        }
    }
}

fn ghost_flags(symbol: &Symbol) -> (bool, bool) {
    let mut left = false;
    let mut right = false;
    for node in symbol.pre_order() {
        left |= node.has_left_ghost_cell();
        right |= node.has_right_ghost_cell();
    }
    (left, right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finite_volume::FiniteVolume;
    use crate::mesh::SubMesh;

    fn discretisation_for_testing() -> Discretisation {
        let mut mesh = Mesh::new();
        mesh.add_submeshes("negative electrode", vec![SubMesh::uniform(0.0, 0.3, 5)])
            .unwrap();
        mesh.add_submeshes("separator", vec![SubMesh::uniform(0.3, 0.5, 4)])
            .unwrap();
        mesh.add_submeshes("positive electrode", vec![SubMesh::uniform(0.5, 1.0, 5)])
            .unwrap();
        mesh.add_submeshes("test", vec![SubMesh::uniform(0.0, 1.0, 10)])
            .unwrap();
        let mesh = Rc::new(mesh);

        let fv: Rc<dyn SpatialMethod> = Rc::new(FiniteVolume::new(Rc::clone(&mesh)));
        let mut methods: SpatialMethodMap = HashMap::new();
        methods.insert(crate::spatial::MACROSCALE.to_owned(), Rc::clone(&fv));
        methods.insert("test".to_owned(), fv);
        Discretisation::new(mesh, methods)
    }

    #[test]
    fn scalar_variables_each_take_one_slot() {
        let mut disc = discretisation_for_testing();
        let a = Symbol::variable("a", &[]).unwrap();
        let b = Symbol::variable("b", &[]).unwrap();
        let c = Symbol::variable("c", &[]).unwrap();
        disc.set_variable_slices(&[a.clone(), b.clone(), c.clone()])
            .unwrap();

        assert_eq!(3, disc.y_slices().total_size());
        assert_eq!(Some(0..1), disc.y_slices().get(a.id()));
        assert_eq!(Some(1..2), disc.y_slices().get(b.id()));
        assert_eq!(Some(2..3), disc.y_slices().get(c.id()));
    }

    #[test]
    fn domain_variables_take_their_mesh_size() {
        let mut disc = discretisation_for_testing();
        let a = Symbol::variable("a", &["negative electrode"]).unwrap();
        let b = Symbol::variable("b", &["separator", "positive electrode"]).unwrap();
        let c = Symbol::variable("c", &[]).unwrap();
        disc.set_variable_slices(&[a.clone(), b.clone(), c.clone()])
            .unwrap();

        assert_eq!(Some(0..5), disc.y_slices().get(a.id()));
        assert_eq!(Some(5..14), disc.y_slices().get(b.id()));
        assert_eq!(Some(14..15), disc.y_slices().get(c.id()));
        assert_eq!(15, disc.y_slices().total_size());
    }

    #[test]
    fn concatenation_keys_are_unpacked() {
        let mut disc = discretisation_for_testing();
        let a = Symbol::variable("a", &["negative electrode"]).unwrap();
        let b = Symbol::variable("b", &["separator"]).unwrap();
        let conc = Symbol::concatenation(vec![a.clone(), b.clone()]).unwrap();
        disc.set_variable_slices(&[conc]).unwrap();

        assert_eq!(Some(0..5), disc.y_slices().get(a.id()));
        assert_eq!(Some(5..9), disc.y_slices().get(b.id()));
    }

    #[test]
    fn slice_assignment_is_reproducible() {
        let vars = || {
            vec![
                Symbol::variable("a", &["negative electrode"]).unwrap(),
                Symbol::variable("b", &[]).unwrap(),
                Symbol::variable("c", &["test"]).unwrap(),
            ]
        };
        let mut first = discretisation_for_testing();
        first.set_variable_slices(&vars()).unwrap();
        let mut second = discretisation_for_testing();
        second.set_variable_slices(&vars()).unwrap();
        assert_eq!(first.y_slices(), second.y_slices());
    }

    #[test]
    fn variables_become_state_slices() {
        let mut disc = discretisation_for_testing();
        let c = Symbol::variable("c", &["test"]).unwrap();
        disc.set_variable_slices(&[c.clone()]).unwrap();

        let disc_c = disc.process_symbol(&c).unwrap();
        assert!(
            matches!(disc_c.kind(), SymbolKind::StateVector(slice) if *slice == (0..10))
        );
        assert_eq!(c.domain(), disc_c.domain());
    }

    #[test]
    #[should_panic(expected = "missing from the slice map")]
    fn unmapped_variable_is_a_programmer_error() {
        let disc = discretisation_for_testing();
        let c = Symbol::variable("c", &["test"]).unwrap();
        let _ = disc.process_symbol(&c);
    }

    #[test]
    fn unknown_spatial_method_is_a_domain_error() {
        let mut disc = discretisation_for_testing();
        let c = Symbol::variable("c", &["negative particle"]).unwrap();
        let mut mesh = Mesh::new();
        mesh.add_submeshes("negative particle", vec![SubMesh::uniform(0.0, 1.0, 3)])
            .unwrap();
        disc.mesh = Rc::new(mesh);
        disc.set_variable_slices(&[c.clone()]).unwrap();

        let grad = Symbol::gradient(c).unwrap();
        let err = disc.process_symbol(&grad).unwrap_err();
        assert_eq!(crate::common::ErrorKind::Domain, err.kind);
    }
}
