// Copyright 2026 The Cellsim Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The expression node.
//!
//! Equations are immutable trees of `Symbol`s: rewriting produces new nodes
//! rather than mutating in place, so subtrees can be shared freely via `Rc`.
//! Every node carries the ordered list of region names it is defined over and
//! a structural identity: a content hash over the node kind, its literal
//! payload and its children's identities.  Two trees with the same structure
//! compare identical no matter how they were built, which is what evaluation
//! memoisation and the discretiser's slice map key on.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::rc::Rc;

use ordered_float::OrderedFloat;
use smallvec::SmallVec;
use sprs::CsMat;

use crate::common::{Ident, Result};
use crate::domain::{self, DomainName};
use crate::domain_err;
use crate::mesh::Mesh;

pub type SymbolId = u64;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    MatMul,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let op = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "**",
            BinaryOp::MatMul => "@",
        };
        write!(f, "{op}")
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum UnaryOp {
    Neg,
    Abs,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum BuiltinFn {
    Exp,
    Ln,
    Sqrt,
    Sin,
    Cos,
    Tanh,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum SpatialOp {
    Gradient,
    Divergence,
    Integral,
    IndefiniteIntegral,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Per-domain slice bookkeeping for a `DomainConcatenation`: where each
/// region lands in the node's own flattened output, and where it sits inside
/// each child's flattened output.
#[derive(Clone, PartialEq, Debug)]
pub struct DomainSlices {
    pub own: Vec<(DomainName, Range<usize>)>,
    pub children: Vec<Vec<(DomainName, Range<usize>)>>,
    pub size: usize,
}

#[derive(Clone, PartialEq, Debug)]
pub enum SymbolKind {
    /// A constant number.
    Scalar(f64),
    /// A named parameter, substituted by a pre-processing pass before
    /// discretisation.  Evaluating one is an error.
    Parameter(Ident),
    /// A named, unresolved function of an argument expression.
    FunctionParameter(Ident, Rc<Symbol>),
    /// A state variable placeholder; discretisation replaces it with a
    /// `StateVector` slice.
    Variable(Ident),
    /// A spatial coordinate; discretisation replaces it with the mesh node
    /// positions.
    SpatialVariable(Ident),
    /// The independent time variable.
    Time,
    /// A dense constant column vector.
    Vector(Vec<f64>),
    /// A sparse constant matrix.
    Matrix(CsMat<f64>),
    /// A slice of the flat numeric state vector.
    StateVector(Range<usize>),
    Binary(BinaryOp, Rc<Symbol>, Rc<Symbol>),
    Unary(UnaryOp, Rc<Symbol>),
    Builtin(BuiltinFn, Rc<Symbol>),
    Spatial(SpatialOp, Rc<Symbol>),
    BoundaryValue(Side, Rc<Symbol>),
    /// Broadcast a domain-independent child to the node's domain; rewritten
    /// by the discretiser into a mesh-sized operation.
    Broadcast(Rc<Symbol>),
    /// The discretised broadcast: the child's single value replicated npts
    /// times.  `Repeat(x, 1)` lifts a number to a length-1 vector so it can
    /// take part in flat concatenation.
    Repeat(Rc<Symbol>, usize),
    /// Domain-aware concatenation of disjoint-domain children.  Cannot be
    /// evaluated; the discretiser rewrites it against the mesh.
    Concatenation(Vec<Rc<Symbol>>),
    /// Concatenation of evaluated children in child order, domains ignored.
    FlatConcatenation(Vec<Rc<Symbol>>),
    /// Concatenation respecting the global domain ordering, with slice
    /// bookkeeping derived from the mesh.
    DomainConcatenation(Vec<Rc<Symbol>>, DomainSlices),
}

#[derive(Clone, PartialEq, Debug)]
pub struct Symbol {
    kind: SymbolKind,
    domain: Vec<DomainName>,
    id: SymbolId,
    has_left_ghost_cell: bool,
    has_right_ghost_cell: bool,
}

fn content_hash(
    kind: &SymbolKind,
    domain: &[DomainName],
    left_ghost: bool,
    right_ghost: bool,
) -> SymbolId {
    let mut h = DefaultHasher::new();
    match kind {
        SymbolKind::Scalar(v) => {
            0u8.hash(&mut h);
            OrderedFloat(*v).hash(&mut h);
        }
        SymbolKind::Parameter(name) => {
            1u8.hash(&mut h);
            name.hash(&mut h);
        }
        SymbolKind::FunctionParameter(name, arg) => {
            2u8.hash(&mut h);
            name.hash(&mut h);
            arg.id.hash(&mut h);
        }
        SymbolKind::Variable(name) => {
            3u8.hash(&mut h);
            name.hash(&mut h);
        }
        SymbolKind::SpatialVariable(name) => {
            4u8.hash(&mut h);
            name.hash(&mut h);
        }
        SymbolKind::Time => {
            5u8.hash(&mut h);
        }
        SymbolKind::Vector(entries) => {
            6u8.hash(&mut h);
            entries.len().hash(&mut h);
            for v in entries {
                OrderedFloat(*v).hash(&mut h);
            }
        }
        SymbolKind::Matrix(m) => {
            7u8.hash(&mut h);
            m.rows().hash(&mut h);
            m.cols().hash(&mut h);
            for (v, (r, c)) in m.iter() {
                r.hash(&mut h);
                c.hash(&mut h);
                OrderedFloat(*v).hash(&mut h);
            }
        }
        SymbolKind::StateVector(slice) => {
            8u8.hash(&mut h);
            slice.start.hash(&mut h);
            slice.end.hash(&mut h);
        }
        SymbolKind::Binary(op, l, r) => {
            9u8.hash(&mut h);
            op.hash(&mut h);
            l.id.hash(&mut h);
            r.id.hash(&mut h);
        }
        SymbolKind::Unary(op, c) => {
            10u8.hash(&mut h);
            op.hash(&mut h);
            c.id.hash(&mut h);
        }
        SymbolKind::Builtin(func, c) => {
            11u8.hash(&mut h);
            func.hash(&mut h);
            c.id.hash(&mut h);
        }
        SymbolKind::Spatial(op, c) => {
            12u8.hash(&mut h);
            op.hash(&mut h);
            c.id.hash(&mut h);
        }
        SymbolKind::BoundaryValue(side, c) => {
            13u8.hash(&mut h);
            side.hash(&mut h);
            c.id.hash(&mut h);
        }
        SymbolKind::Broadcast(c) => {
            14u8.hash(&mut h);
            c.id.hash(&mut h);
        }
        SymbolKind::Repeat(c, npts) => {
            15u8.hash(&mut h);
            c.id.hash(&mut h);
            npts.hash(&mut h);
        }
        SymbolKind::Concatenation(children) => {
            16u8.hash(&mut h);
            for c in children {
                c.id.hash(&mut h);
            }
        }
        SymbolKind::FlatConcatenation(children) => {
            17u8.hash(&mut h);
            for c in children {
                c.id.hash(&mut h);
            }
        }
        SymbolKind::DomainConcatenation(children, slices) => {
            18u8.hash(&mut h);
            for c in children {
                c.id.hash(&mut h);
            }
            slices.size.hash(&mut h);
        }
    }
    domain.hash(&mut h);
    left_ghost.hash(&mut h);
    right_ghost.hash(&mut h);
    h.finish()
}

impl Symbol {
    fn with_domain(kind: SymbolKind, domain: Vec<DomainName>) -> Symbol {
        let id = content_hash(&kind, &domain, false, false);
        Symbol {
            kind,
            domain,
            id,
            has_left_ghost_cell: false,
            has_right_ghost_cell: false,
        }
    }

    fn plain(kind: SymbolKind) -> Symbol {
        Symbol::with_domain(kind, vec![])
    }

    // ── Leaves ───────────────────────────────────────────────────────────

    pub fn scalar(value: f64) -> Symbol {
        Symbol::plain(SymbolKind::Scalar(value))
    }

    pub fn parameter(name: &str) -> Symbol {
        Symbol::plain(SymbolKind::Parameter(name.to_owned()))
    }

    pub fn function_parameter(name: &str, arg: Symbol) -> Symbol {
        let domain = arg.domain.clone();
        Symbol::with_domain(
            SymbolKind::FunctionParameter(name.to_owned(), Rc::new(arg)),
            domain,
        )
    }

    pub fn variable(name: &str, domain: &[&str]) -> Result<Symbol> {
        let domain: Vec<DomainName> = domain.iter().map(|d| (*d).to_owned()).collect();
        domain::check_known(&domain)?;
        Ok(Symbol::with_domain(
            SymbolKind::Variable(name.to_owned()),
            domain,
        ))
    }

    pub fn spatial_variable(name: &str, domain: &[&str]) -> Result<Symbol> {
        let domain: Vec<DomainName> = domain.iter().map(|d| (*d).to_owned()).collect();
        if domain.is_empty() {
            return domain_err!(
                EmptyDomain,
                format!("spatial variable '{name}' needs a domain")
            );
        }
        domain::check_known(&domain)?;
        Ok(Symbol::with_domain(
            SymbolKind::SpatialVariable(name.to_owned()),
            domain,
        ))
    }

    pub fn time() -> Symbol {
        Symbol::plain(SymbolKind::Time)
    }

    pub fn vector(entries: Vec<f64>) -> Symbol {
        Symbol::plain(SymbolKind::Vector(entries))
    }

    pub fn vector_with_domain(entries: Vec<f64>, domain: &[DomainName]) -> Result<Symbol> {
        domain::check_known(domain)?;
        Ok(Symbol::with_domain(
            SymbolKind::Vector(entries),
            domain.to_vec(),
        ))
    }

    pub fn matrix(entries: CsMat<f64>) -> Symbol {
        Symbol::plain(SymbolKind::Matrix(entries))
    }

    pub fn state_vector(slice: Range<usize>) -> Symbol {
        Symbol::plain(SymbolKind::StateVector(slice))
    }

    pub fn state_vector_with_domain(slice: Range<usize>, domain: &[DomainName]) -> Symbol {
        Symbol::with_domain(SymbolKind::StateVector(slice), domain.to_vec())
    }

    // ── Operators ────────────────────────────────────────────────────────

    pub fn binary(op: BinaryOp, left: Symbol, right: Symbol) -> Result<Symbol> {
        let domain = domain::combine_binary(&left.domain, &right.domain)?;
        Ok(Symbol::with_domain(
            SymbolKind::Binary(op, Rc::new(left), Rc::new(right)),
            domain,
        ))
    }

    pub fn add(left: Symbol, right: Symbol) -> Result<Symbol> {
        Symbol::binary(BinaryOp::Add, left, right)
    }

    pub fn sub(left: Symbol, right: Symbol) -> Result<Symbol> {
        Symbol::binary(BinaryOp::Sub, left, right)
    }

    pub fn mul(left: Symbol, right: Symbol) -> Result<Symbol> {
        Symbol::binary(BinaryOp::Mul, left, right)
    }

    pub fn div(left: Symbol, right: Symbol) -> Result<Symbol> {
        Symbol::binary(BinaryOp::Div, left, right)
    }

    pub fn pow(left: Symbol, right: Symbol) -> Result<Symbol> {
        Symbol::binary(BinaryOp::Pow, left, right)
    }

    pub fn matmul(left: Symbol, right: Symbol) -> Result<Symbol> {
        Symbol::binary(BinaryOp::MatMul, left, right)
    }

    pub fn neg(child: Symbol) -> Symbol {
        let domain = child.domain.clone();
        Symbol::with_domain(SymbolKind::Unary(UnaryOp::Neg, Rc::new(child)), domain)
    }

    pub fn abs(child: Symbol) -> Symbol {
        let domain = child.domain.clone();
        Symbol::with_domain(SymbolKind::Unary(UnaryOp::Abs, Rc::new(child)), domain)
    }

    pub fn builtin(func: BuiltinFn, child: Symbol) -> Symbol {
        let domain = child.domain.clone();
        Symbol::with_domain(SymbolKind::Builtin(func, Rc::new(child)), domain)
    }

    fn spatial(op: SpatialOp, child: Symbol, result_domain: Vec<DomainName>) -> Result<Symbol> {
        if child.domain.is_empty() {
            return domain_err!(
                EmptyDomain,
                format!("cannot apply a spatial operator to domain-independent '{child}'")
            );
        }
        Ok(Symbol::with_domain(
            SymbolKind::Spatial(op, Rc::new(child)),
            result_domain,
        ))
    }

    pub fn gradient(child: Symbol) -> Result<Symbol> {
        let domain = child.domain.clone();
        Symbol::spatial(SpatialOp::Gradient, child, domain)
    }

    pub fn divergence(child: Symbol) -> Result<Symbol> {
        let domain = child.domain.clone();
        Symbol::spatial(SpatialOp::Divergence, child, domain)
    }

    /// Definite integral over the child's whole domain; the result is a
    /// single number and carries no domain.
    pub fn integral(child: Symbol) -> Result<Symbol> {
        Symbol::spatial(SpatialOp::Integral, child, vec![])
    }

    pub fn indefinite_integral(child: Symbol) -> Result<Symbol> {
        let domain = child.domain.clone();
        Symbol::spatial(SpatialOp::IndefiniteIntegral, child, domain)
    }

    pub fn boundary_value(child: Symbol, side: Side) -> Result<Symbol> {
        if child.domain.is_empty() {
            return domain_err!(
                EmptyDomain,
                format!("cannot take a boundary value of domain-independent '{child}'")
            );
        }
        Ok(Symbol::plain(SymbolKind::BoundaryValue(
            side,
            Rc::new(child),
        )))
    }

    // ── Broadcasts and concatenations ────────────────────────────────────

    pub fn broadcast(child: Symbol, domain: &[&str]) -> Result<Symbol> {
        let domain: Vec<DomainName> = domain.iter().map(|d| (*d).to_owned()).collect();
        domain::check_known(&domain)?;
        if !child.domain.is_empty() && child.domain != domain {
            return domain_err!(
                DomainMismatch,
                format!(
                    "domain of a broadcast child must be empty or {:?}, but is {:?}",
                    domain, child.domain
                )
            );
        }
        Ok(Symbol::with_domain(
            SymbolKind::Broadcast(Rc::new(child)),
            domain,
        ))
    }

    pub fn repeat(child: Symbol, npts: usize, domain: &[DomainName]) -> Symbol {
        Symbol::with_domain(SymbolKind::Repeat(Rc::new(child), npts), domain.to_vec())
    }

    pub fn concatenation(children: Vec<Symbol>) -> Result<Symbol> {
        let child_domains: Vec<&[DomainName]> =
            children.iter().map(|c| c.domain.as_slice()).collect();
        let domain = domain::combine_disjoint(&child_domains)?;
        Ok(Symbol::with_domain(
            SymbolKind::Concatenation(children.into_iter().map(Rc::new).collect()),
            domain,
        ))
    }

    /// Concatenate equations when domains don't matter.  Children that
    /// evaluate to a single number are lifted to length-1 vectors first.
    pub fn flat_concatenation(children: Vec<Symbol>) -> Symbol {
        let children = children
            .into_iter()
            .map(|c| {
                if c.evaluates_to_number() {
                    Symbol::repeat(c, 1, &[])
                } else {
                    c
                }
            })
            .map(Rc::new)
            .collect();
        Symbol::plain(SymbolKind::FlatConcatenation(children))
    }

    /// Concatenate domain-scoped children into one vector ordered by the
    /// global domain ordering, sizing each region's slice from the mesh.
    pub fn domain_concatenation(children: Vec<Symbol>, mesh: &Mesh) -> Result<Symbol> {
        let child_domains: Vec<&[DomainName]> =
            children.iter().map(|c| c.domain.as_slice()).collect();
        let domain = domain::combine_disjoint(&child_domains)?;
        if domain.is_empty() {
            return domain_err!(
                EmptyDomain,
                "domain cannot be empty for a domain concatenation; should the children have \
                 been broadcast first?"
                    .to_owned()
            );
        }

        let own = create_slices(&domain, mesh)?;
        let size = own.last().map(|(_, slice)| slice.end).unwrap_or(0);
        let per_child = children
            .iter()
            .map(|c| create_slices(&c.domain, mesh))
            .collect::<Result<Vec<_>>>()?;

        let slices = DomainSlices {
            own,
            children: per_child,
            size,
        };
        Ok(Symbol::with_domain(
            SymbolKind::DomainConcatenation(
                children.into_iter().map(Rc::new).collect(),
                slices,
            ),
            domain,
        ))
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn kind(&self) -> &SymbolKind {
        &self.kind
    }

    pub fn domain(&self) -> &[DomainName] {
        &self.domain
    }

    pub fn id(&self) -> SymbolId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            SymbolKind::Parameter(name)
            | SymbolKind::FunctionParameter(name, _)
            | SymbolKind::Variable(name)
            | SymbolKind::SpatialVariable(name) => Some(name),
            _ => None,
        }
    }

    pub fn has_left_ghost_cell(&self) -> bool {
        self.has_left_ghost_cell
    }

    pub fn has_right_ghost_cell(&self) -> bool {
        self.has_right_ghost_cell
    }

    pub(crate) fn with_ghost_cells(mut self, left: bool, right: bool) -> Symbol {
        self.has_left_ghost_cell = left;
        self.has_right_ghost_cell = right;
        self.id = content_hash(&self.kind, &self.domain, left, right);
        self
    }

    pub fn children(&self) -> SmallVec<[&Symbol; 2]> {
        match &self.kind {
            SymbolKind::Scalar(_)
            | SymbolKind::Parameter(_)
            | SymbolKind::Variable(_)
            | SymbolKind::SpatialVariable(_)
            | SymbolKind::Time
            | SymbolKind::Vector(_)
            | SymbolKind::Matrix(_)
            | SymbolKind::StateVector(_) => SmallVec::new(),
            SymbolKind::FunctionParameter(_, c)
            | SymbolKind::Unary(_, c)
            | SymbolKind::Builtin(_, c)
            | SymbolKind::Spatial(_, c)
            | SymbolKind::BoundaryValue(_, c)
            | SymbolKind::Broadcast(c)
            | SymbolKind::Repeat(c, _) => {
                let mut out = SmallVec::new();
                out.push(c.as_ref());
                out
            }
            SymbolKind::Binary(_, l, r) => {
                let mut out = SmallVec::new();
                out.push(l.as_ref());
                out.push(r.as_ref());
                out
            }
            SymbolKind::Concatenation(children)
            | SymbolKind::FlatConcatenation(children)
            | SymbolKind::DomainConcatenation(children, _) => {
                children.iter().map(|c| c.as_ref()).collect()
            }
        }
    }

    /// All nodes of the tree, parents before children.
    pub fn pre_order(&self) -> Vec<&Symbol> {
        let mut out = Vec::new();
        self.walk(&mut out);
        out
    }

    fn walk<'a>(&'a self, out: &mut Vec<&'a Symbol>) {
        out.push(self);
        for child in self.children() {
            child.walk(out);
        }
    }

    /// A structurally identical copy that shares no `Rc` spine with `self`.
    pub fn new_copy(&self) -> Symbol {
        let children: Vec<Symbol> = self.children().iter().map(|c| c.new_copy()).collect();
        self.rebuild(children)
    }

    /// Reconstruct this node around replacement children (which must match
    /// in number).  Payload, domain, slice bookkeeping and ghost flags are
    /// preserved.
    pub(crate) fn rebuild(&self, children: Vec<Symbol>) -> Symbol {
        assert_eq!(
            self.children().len(),
            children.len(),
            "rebuild with wrong child count"
        );
        let mut iter = children.into_iter();
        let kind = match &self.kind {
            SymbolKind::Scalar(_)
            | SymbolKind::Parameter(_)
            | SymbolKind::Variable(_)
            | SymbolKind::SpatialVariable(_)
            | SymbolKind::Time
            | SymbolKind::Vector(_)
            | SymbolKind::Matrix(_)
            | SymbolKind::StateVector(_) => self.kind.clone(),
            SymbolKind::FunctionParameter(name, _) => {
                SymbolKind::FunctionParameter(name.clone(), Rc::new(iter.next().unwrap()))
            }
            SymbolKind::Unary(op, _) => SymbolKind::Unary(*op, Rc::new(iter.next().unwrap())),
            SymbolKind::Builtin(func, _) => {
                SymbolKind::Builtin(*func, Rc::new(iter.next().unwrap()))
            }
            SymbolKind::Spatial(op, _) => {
                SymbolKind::Spatial(*op, Rc::new(iter.next().unwrap()))
            }
            SymbolKind::BoundaryValue(side, _) => {
                SymbolKind::BoundaryValue(*side, Rc::new(iter.next().unwrap()))
            }
            SymbolKind::Broadcast(_) => SymbolKind::Broadcast(Rc::new(iter.next().unwrap())),
            SymbolKind::Repeat(_, npts) => {
                SymbolKind::Repeat(Rc::new(iter.next().unwrap()), *npts)
            }
            SymbolKind::Binary(op, _, _) => {
                let l = Rc::new(iter.next().unwrap());
                let r = Rc::new(iter.next().unwrap());
                SymbolKind::Binary(*op, l, r)
            }
            SymbolKind::Concatenation(_) => {
                SymbolKind::Concatenation(iter.by_ref().map(Rc::new).collect())
            }
            SymbolKind::FlatConcatenation(_) => {
                SymbolKind::FlatConcatenation(iter.by_ref().map(Rc::new).collect())
            }
            SymbolKind::DomainConcatenation(_, slices) => SymbolKind::DomainConcatenation(
                iter.by_ref().map(Rc::new).collect(),
                slices.clone(),
            ),
        };
        let node = Symbol::with_domain(kind, self.domain.clone());
        node.with_ghost_cells(self.has_left_ghost_cell, self.has_right_ghost_cell)
    }

    // ── Structural queries ───────────────────────────────────────────────

    /// Whether evaluating this node yields a single number, derived from
    /// structure alone.
    pub fn evaluates_to_number(&self) -> bool {
        match &self.kind {
            SymbolKind::Scalar(_) | SymbolKind::Time | SymbolKind::Parameter(_) => true,
            SymbolKind::Unary(_, c) | SymbolKind::Builtin(_, c) => c.evaluates_to_number(),
            SymbolKind::Binary(BinaryOp::MatMul, _, _) => false,
            SymbolKind::Binary(_, l, r) => l.evaluates_to_number() && r.evaluates_to_number(),
            _ => false,
        }
    }

    /// Whether the tree contains no time, state or unresolved-symbol leaves,
    /// i.e. it can in principle be folded to a constant.
    pub fn is_constant(&self) -> bool {
        !self.pre_order().iter().any(|s| {
            matches!(
                s.kind,
                SymbolKind::Time
                    | SymbolKind::Variable(_)
                    | SymbolKind::Parameter(_)
                    | SymbolKind::FunctionParameter(_, _)
                    | SymbolKind::SpatialVariable(_)
                    | SymbolKind::StateVector(_)
            )
        })
    }

    /// Whether the tree applies a gradient that is not consumed by a
    /// divergence.  Used to decide diffusivity averaging when gradient and
    /// non-gradient quantities combine.
    pub fn has_gradient_and_not_divergence(&self) -> bool {
        let mut has_gradient = false;
        for node in self.pre_order() {
            match node.kind {
                SymbolKind::Spatial(SpatialOp::Divergence, _) => return false,
                SymbolKind::Spatial(SpatialOp::Gradient, _) => has_gradient = true,
                _ => {}
            }
        }
        has_gradient
    }

    /// The same node with its domain replaced (e.g. a boundary value is a
    /// single number and drops its child's domain).
    pub(crate) fn replace_domain(mut self, domain: Vec<DomainName>) -> Symbol {
        self.domain = domain;
        self.id = content_hash(
            &self.kind,
            &self.domain,
            self.has_left_ghost_cell,
            self.has_right_ghost_cell,
        );
        self
    }

    /// A constant leaf holding an already-evaluated value, keeping `domain`.
    pub(crate) fn constant_from_value(
        value: crate::value::Value,
        domain: Vec<DomainName>,
    ) -> Symbol {
        use crate::value::Value;
        let kind = match value {
            Value::Scalar(v) => SymbolKind::Scalar(v),
            Value::Vector(entries) => SymbolKind::Vector(entries),
            Value::Matrix(m) => SymbolKind::Matrix(m),
        };
        Symbol::with_domain(kind, domain)
    }

    pub(crate) fn evaluation_error(&self) -> crate::common::Error {
        use crate::common::{Error, ErrorCode, ErrorKind};
        Error::new(
            ErrorKind::Model,
            ErrorCode::UnresolvedSymbol,
            Some(format!("'{self}' must be discretised before evaluation")),
        )
    }
}

fn create_slices(
    domain: &[DomainName],
    mesh: &Mesh,
) -> Result<Vec<(DomainName, Range<usize>)>> {
    let mut slices = Vec::with_capacity(domain.len());
    let mut start = 0;
    let mut end = 0;
    for dom in domain {
        let submeshes = mesh.get(dom)?;
        let prim_pts = submeshes[0].npts;
        let second_pts = submeshes.len();
        end += prim_pts * second_pts;
        slices.push((dom.clone(), start..end));
        start = end;
    }
    Ok(slices)
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            SymbolKind::Scalar(v) => write!(f, "{v}"),
            SymbolKind::Parameter(name)
            | SymbolKind::Variable(name)
            | SymbolKind::SpatialVariable(name) => write!(f, "{name}"),
            SymbolKind::FunctionParameter(name, arg) => write!(f, "{name}({arg})"),
            SymbolKind::Time => write!(f, "t"),
            SymbolKind::Vector(entries) => write!(f, "vector[{}]", entries.len()),
            SymbolKind::Matrix(m) => write!(f, "matrix[{}x{}]", m.rows(), m.cols()),
            SymbolKind::StateVector(slice) => write!(f, "y[{}:{}]", slice.start, slice.end),
            SymbolKind::Binary(op, l, r) => write!(f, "({l} {op} {r})"),
            SymbolKind::Unary(UnaryOp::Neg, c) => write!(f, "(-{c})"),
            SymbolKind::Unary(UnaryOp::Abs, c) => write!(f, "abs({c})"),
            SymbolKind::Builtin(func, c) => {
                let name = match func {
                    BuiltinFn::Exp => "exp",
                    BuiltinFn::Ln => "ln",
                    BuiltinFn::Sqrt => "sqrt",
                    BuiltinFn::Sin => "sin",
                    BuiltinFn::Cos => "cos",
                    BuiltinFn::Tanh => "tanh",
                };
                write!(f, "{name}({c})")
            }
            SymbolKind::Spatial(SpatialOp::Gradient, c) => write!(f, "grad({c})"),
            SymbolKind::Spatial(SpatialOp::Divergence, c) => write!(f, "div({c})"),
            SymbolKind::Spatial(SpatialOp::Integral, c) => write!(f, "integral({c})"),
            SymbolKind::Spatial(SpatialOp::IndefiniteIntegral, c) => {
                write!(f, "indefinite_integral({c})")
            }
            SymbolKind::BoundaryValue(side, c) => write!(f, "boundary_value({c}, {side})"),
            SymbolKind::Broadcast(c) => write!(f, "broadcast({c}, {:?})", self.domain),
            SymbolKind::Repeat(c, npts) => write!(f, "repeat({c}, {npts})"),
            SymbolKind::Concatenation(children) => {
                write!(f, "concatenation[{}]", children.len())
            }
            SymbolKind::FlatConcatenation(children) => {
                write!(f, "flat_concatenation[{}]", children.len())
            }
            SymbolKind::DomainConcatenation(children, slices) => {
                write!(
                    f,
                    "domain_concatenation[{} -> {}]",
                    children.len(),
                    slices.size
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, domain: &[&str]) -> Symbol {
        Symbol::variable(name, domain).unwrap()
    }

    #[test]
    fn structural_identity_not_address_identity() {
        let a = Symbol::add(Symbol::scalar(1.0), Symbol::parameter("k")).unwrap();
        let b = Symbol::add(Symbol::scalar(1.0), Symbol::parameter("k")).unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(a, b);

        let c = Symbol::add(Symbol::scalar(2.0), Symbol::parameter("k")).unwrap();
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn new_copy_preserves_identity() {
        let conc = Symbol::concatenation(vec![
            var("a", &["negative electrode"]),
            var("b", &["separator"]),
        ])
        .unwrap();
        let copy = conc.new_copy();
        assert_eq!(conc.id(), copy.id());
        assert_eq!(conc, copy);
    }

    #[test]
    fn concatenation_sorts_and_rejects_overlap() {
        let a = var("a", &["negative electrode"]);
        let b = var("b", &["separator", "positive electrode"]);
        let c = var("c", &["test"]);
        let conc = Symbol::concatenation(vec![c.clone(), a.clone(), b.clone()]).unwrap();
        assert_eq!(
            vec![
                "negative electrode".to_owned(),
                "separator".to_owned(),
                "positive electrode".to_owned(),
                "test".to_owned(),
            ],
            conc.domain().to_vec()
        );

        let d = var("d", &["separator"]);
        assert!(Symbol::concatenation(vec![a, b, d]).is_err());
    }

    #[test]
    fn binary_domain_rules() {
        let a = var("a", &["negative electrode"]);
        let b = var("b", &["separator"]);
        assert!(Symbol::add(a.clone(), b).is_err());

        let scaled = Symbol::mul(Symbol::scalar(3.0), a.clone()).unwrap();
        assert_eq!(&["negative electrode".to_owned()], scaled.domain());
    }

    #[test]
    fn broadcast_requires_compatible_domain() {
        let a = var("a", &["negative electrode"]);
        assert!(Symbol::broadcast(a, &["separator"]).is_err());
        assert!(Symbol::broadcast(Symbol::scalar(1.0), &["separator"]).is_ok());
    }

    #[test]
    fn evaluates_to_number_is_structural() {
        assert!(Symbol::scalar(4.0).evaluates_to_number());
        assert!(Symbol::time().evaluates_to_number());
        assert!(
            Symbol::mul(Symbol::scalar(2.0), Symbol::time())
                .unwrap()
                .evaluates_to_number()
        );
        assert!(!Symbol::vector(vec![1.0, 2.0]).evaluates_to_number());
        assert!(!Symbol::state_vector(0..3).evaluates_to_number());
    }

    #[test]
    fn gradient_queries() {
        let c = var("c", &["negative electrode"]);
        let grad = Symbol::gradient(c.clone()).unwrap();
        assert!(grad.has_gradient_and_not_divergence());
        let div = Symbol::divergence(grad.clone()).unwrap();
        assert!(!div.has_gradient_and_not_divergence());

        assert!(Symbol::gradient(Symbol::scalar(1.0)).is_err());
    }

    #[test]
    fn pre_order_parents_first() {
        let e = Symbol::mul(
            Symbol::scalar(2.0),
            Symbol::add(Symbol::time(), Symbol::scalar(1.0)).unwrap(),
        )
        .unwrap();
        let order: Vec<_> = e.pre_order();
        assert_eq!(5, order.len());
        assert!(matches!(
            order[0].kind(),
            SymbolKind::Binary(BinaryOp::Mul, _, _)
        ));
        assert!(matches!(order[1].kind(), SymbolKind::Scalar(_)));
        assert!(matches!(
            order[2].kind(),
            SymbolKind::Binary(BinaryOp::Add, _, _)
        ));
    }

    #[test]
    fn ghost_flags_change_identity() {
        let v = Symbol::state_vector(0..4);
        let flagged = v.clone().with_ghost_cells(true, false);
        assert_ne!(v.id(), flagged.id());
        assert!(flagged.has_left_ghost_cell());
        assert!(!flagged.has_right_ghost_cell());
    }
}
