// Copyright 2026 The Cellsim Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Evaluation-preserving tree simplification.
//!
//! This pass exists purely for performance: for every valid `(t, y)` the
//! simplified tree evaluates to the same value, with the same shape and the
//! same domain, as the tree it came from.  Skipping it never changes
//! results.
//!
//! Rules, applied bottom-up: fold constant-only subtrees to a single
//! constant leaf; eliminate additive and multiplicative identities; fold
//! chains of constant matrix products left-to-right so a sparse operator is
//! applied to a vector instead of materialising intermediate products (a
//! product is never distributed over its operand's sub-expressions, which
//! would lose sparsity); collapse a concatenation of contiguous state-vector
//! slices into a single slice.

use log::trace;

use crate::common::Result;
use crate::eval::evaluate;
use crate::symbol::{BinaryOp, Symbol, SymbolKind, UnaryOp};

/// Simplify a tree.  `simplify(simplify(e))` is structurally `simplify(e)`.
pub fn simplify(symbol: &Symbol) -> Result<Symbol> {
    let children = symbol
        .children()
        .iter()
        .map(|c| simplify(c))
        .collect::<Result<Vec<Symbol>>>()?;
    let node = symbol.rebuild(children);
    let node = apply_rules(node)?;
    Ok(simplify_if_constant(node))
}

fn is_scalar_value(symbol: &Symbol, expected: f64) -> bool {
    matches!(symbol.kind(), SymbolKind::Scalar(v) if *v == expected)
}

fn apply_rules(node: Symbol) -> Result<Symbol> {
    // cheap: cloning a kind clones Rc handles, not subtrees
    let kind = node.kind().clone();
    match kind {
        SymbolKind::Binary(op, l, r) => {
            let left = l.as_ref();
            let right = r.as_ref();
            match op {
                BinaryOp::Add => {
                    if is_scalar_value(left, 0.0) {
                        return Ok(right.clone());
                    }
                    if is_scalar_value(right, 0.0) {
                        return Ok(left.clone());
                    }
                }
                BinaryOp::Sub => {
                    if is_scalar_value(right, 0.0) {
                        return Ok(left.clone());
                    }
                    if is_scalar_value(left, 0.0) {
                        return Ok(Symbol::neg(right.clone()));
                    }
                }
                BinaryOp::Mul => {
                    if is_scalar_value(left, 1.0) {
                        return Ok(right.clone());
                    }
                    if is_scalar_value(right, 1.0) {
                        return Ok(left.clone());
                    }
                    // annihilation must not change the result's shape, so a
                    // scalar zero only swallows a number-valued operand
                    if (is_scalar_value(left, 0.0) && right.evaluates_to_number())
                        || (is_scalar_value(right, 0.0) && left.evaluates_to_number())
                    {
                        return Ok(Symbol::scalar(0.0));
                    }
                }
                BinaryOp::Div => {
                    if is_scalar_value(right, 1.0) {
                        return Ok(left.clone());
                    }
                    if is_scalar_value(left, 0.0) && right.evaluates_to_number() {
                        return Ok(Symbol::scalar(0.0));
                    }
                }
                BinaryOp::Pow => {
                    if is_scalar_value(right, 1.0) {
                        return Ok(left.clone());
                    }
                    if is_scalar_value(right, 0.0) && left.evaluates_to_number() {
                        return Ok(Symbol::scalar(1.0));
                    }
                }
                BinaryOp::MatMul => {
                    // (A @ (B @ x)) with constant A and B becomes ((A·B) @ x):
                    // the folded operator keeps its sparsity and the chain is
                    // applied matrix-to-vector at evaluation time
                    if let SymbolKind::Matrix(a) = left.kind() {
                        if let SymbolKind::Binary(BinaryOp::MatMul, inner_l, inner_r) =
                            right.kind()
                        {
                            if let SymbolKind::Matrix(b) = inner_l.kind() {
                                if a.cols() == b.rows() {
                                    let folded = a * b;
                                    return Symbol::matmul(
                                        Symbol::matrix(folded),
                                        inner_r.as_ref().clone(),
                                    );
                                }
                            }
                        }
                    }
                }
            }
            Ok(node)
        }
        SymbolKind::Unary(UnaryOp::Neg, c) => {
            if let SymbolKind::Unary(UnaryOp::Neg, inner) = c.kind() {
                return Ok(inner.as_ref().clone());
            }
            Ok(node)
        }
        SymbolKind::FlatConcatenation(_) | SymbolKind::DomainConcatenation(_, _) => {
            if let Some(collapsed) = collapse_state_slices(&node) {
                trace!("collapsed concatenation to {collapsed}");
                return Ok(collapsed);
            }
            Ok(node)
        }
        _ => Ok(node),
    }
}

/// A concatenation of state-vector slices that are contiguous and increasing
/// is just one bigger slice.
fn collapse_state_slices(node: &Symbol) -> Option<Symbol> {
    let children = node.children();
    let mut slices = Vec::with_capacity(children.len());
    for child in &children {
        match child.kind() {
            SymbolKind::StateVector(slice) => slices.push(slice.clone()),
            _ => return None,
        }
    }
    if slices.is_empty() {
        return None;
    }
    for pair in slices.windows(2) {
        if pair[0].end != pair[1].start {
            return None;
        }
    }
    Some(Symbol::state_vector(
        slices[0].start..slices[slices.len() - 1].end,
    ))
}

/// Fold a subtree with no time, state or unresolved leaves down to a single
/// constant, keeping its domain.  Subtrees that cannot be evaluated yet
/// (e.g. an undiscretised broadcast) are left alone.
fn simplify_if_constant(node: Symbol) -> Symbol {
    if !node.is_constant() {
        return node;
    }
    if matches!(
        node.kind(),
        SymbolKind::Scalar(_) | SymbolKind::Vector(_) | SymbolKind::Matrix(_)
    ) {
        return node;
    }
    match evaluate(&node, None, None) {
        Ok(value) => {
            trace!("folded '{node}' to a constant");
            Symbol::constant_from_value(value, node.domain().to_vec())
        }
        Err(_) => node,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse;
    use crate::value::Value;

    #[test]
    fn constant_trees_fold_and_agree() {
        // (2 + 3) * 4 - 6 / 3
        let e = Symbol::sub(
            Symbol::mul(
                Symbol::add(Symbol::scalar(2.0), Symbol::scalar(3.0)).unwrap(),
                Symbol::scalar(4.0),
            )
            .unwrap(),
            Symbol::div(Symbol::scalar(6.0), Symbol::scalar(3.0)).unwrap(),
        )
        .unwrap();

        let expected = evaluate(&e, None, None).unwrap();
        let simplified = simplify(&e).unwrap();
        assert!(matches!(simplified.kind(), SymbolKind::Scalar(_)));
        assert_eq!(expected, evaluate(&simplified, None, None).unwrap());
    }

    #[test]
    fn identities_are_eliminated() {
        let y = Symbol::state_vector(0..4);

        let e = Symbol::add(y.clone(), Symbol::scalar(0.0)).unwrap();
        assert_eq!(y, simplify(&e).unwrap());

        let e = Symbol::mul(Symbol::scalar(1.0), y.clone()).unwrap();
        assert_eq!(y, simplify(&e).unwrap());

        let e = Symbol::div(y.clone(), Symbol::scalar(1.0)).unwrap();
        assert_eq!(y, simplify(&e).unwrap());

        let e = Symbol::pow(y.clone(), Symbol::scalar(1.0)).unwrap();
        assert_eq!(y, simplify(&e).unwrap());

        // 0 - y becomes a negation
        let e = Symbol::sub(Symbol::scalar(0.0), y.clone()).unwrap();
        assert!(matches!(
            simplify(&e).unwrap().kind(),
            SymbolKind::Unary(UnaryOp::Neg, _)
        ));
    }

    #[test]
    fn zero_annihilation_respects_shape() {
        // 0 * t is a number, safe to fold
        let e = Symbol::mul(Symbol::scalar(0.0), Symbol::time()).unwrap();
        assert!(is_scalar_value(&simplify(&e).unwrap(), 0.0));

        // 0 * y[0:4] evaluates to a vector of zeros, so the node must stay
        let y = Symbol::state_vector(0..4);
        let e = Symbol::mul(Symbol::scalar(0.0), y).unwrap();
        let s = simplify(&e).unwrap();
        let state = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(
            Value::Vector(vec![0.0; 4]),
            evaluate(&s, None, Some(&state)).unwrap()
        );
    }

    #[test]
    fn matmul_chain_folds_left() {
        let a = Symbol::matrix(sparse::from_triplets(
            2,
            2,
            vec![(0, 0, 2.0), (1, 1, 2.0)],
        ));
        let b = Symbol::matrix(sparse::from_triplets(
            2,
            2,
            vec![(0, 1, 1.0), (1, 0, 1.0)],
        ));
        let y = Symbol::state_vector(0..2);

        let chain = Symbol::matmul(a, Symbol::matmul(b, y.clone()).unwrap()).unwrap();
        let simplified = simplify(&chain).unwrap();

        // one matrix node applied straight to the state slice
        match simplified.kind() {
            SymbolKind::Binary(BinaryOp::MatMul, l, r) => {
                assert!(matches!(l.kind(), SymbolKind::Matrix(_)));
                assert_eq!(y, *r.as_ref());
            }
            other => panic!("expected a single product, got {other:?}"),
        }

        let state = [3.0, 5.0];
        assert_eq!(
            evaluate(&chain, None, Some(&state)).unwrap(),
            evaluate(&simplified, None, Some(&state)).unwrap()
        );
    }

    #[test]
    fn contiguous_state_slices_collapse() {
        let conc = Symbol::flat_concatenation(vec![
            Symbol::state_vector(0..10),
            Symbol::state_vector(10..15),
            Symbol::state_vector(15..23),
        ]);
        let simplified = simplify(&conc).unwrap();
        assert!(
            matches!(simplified.kind(), SymbolKind::StateVector(slice) if *slice == (0..23))
        );

        // a gap prevents the collapse
        let conc = Symbol::flat_concatenation(vec![
            Symbol::state_vector(0..10),
            Symbol::state_vector(11..15),
        ]);
        let simplified = simplify(&conc).unwrap();
        assert!(matches!(
            simplified.kind(),
            SymbolKind::FlatConcatenation(_)
        ));
    }

    #[test]
    fn double_negation_cancels() {
        let y = Symbol::state_vector(0..2);
        let e = Symbol::neg(Symbol::neg(y.clone()));
        assert_eq!(y, simplify(&e).unwrap());
    }

    #[test]
    fn idempotent() {
        let e = Symbol::add(
            Symbol::mul(Symbol::scalar(1.0), Symbol::state_vector(0..3)).unwrap(),
            Symbol::mul(Symbol::scalar(2.0), Symbol::scalar(3.0)).unwrap(),
        )
        .unwrap();
        let once = simplify(&e).unwrap();
        let twice = simplify(&once).unwrap();
        assert_eq!(once.id(), twice.id());
        assert_eq!(once, twice);
    }

    #[test]
    fn broadcast_stays_unfolded_until_discretised() {
        let b = Symbol::broadcast(Symbol::scalar(2.0), &["separator"]).unwrap();
        let simplified = simplify(&b).unwrap();
        assert!(matches!(simplified.kind(), SymbolKind::Broadcast(_)));
        assert_eq!(b.domain(), simplified.domain());
    }
}
