// Copyright 2026 The Cellsim Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Numeric evaluation of expression trees.
//!
//! An `Evaluator` is scoped to a single `(t, y)` point and memoises
//! sub-results by structural identity, so sibling expressions evaluated
//! against the same evaluator (the differential and algebraic blocks of a
//! residual, say) share work.  Nothing is cached across calls.

use std::collections::HashMap;

use crate::common::{Error, ErrorCode, ErrorKind, Result};
use crate::model_err;
use crate::symbol::{Symbol, SymbolId, SymbolKind};
use crate::value::Value;

pub struct Evaluator<'a> {
    t: Option<f64>,
    y: Option<&'a [f64]>,
    cache: HashMap<SymbolId, Value>,
}

/// Evaluate a single expression with a fresh cache.
pub fn evaluate(symbol: &Symbol, t: Option<f64>, y: Option<&[f64]>) -> Result<Value> {
    Evaluator::new(t, y).eval(symbol)
}

impl<'a> Evaluator<'a> {
    pub fn new(t: Option<f64>, y: Option<&'a [f64]>) -> Evaluator<'a> {
        Evaluator {
            t,
            y,
            cache: HashMap::new(),
        }
    }

    pub fn eval(&mut self, symbol: &Symbol) -> Result<Value> {
        if let Some(known) = self.cache.get(&symbol.id()) {
            return Ok(known.clone());
        }
        let value = self.eval_uncached(symbol)?;
        self.cache.insert(symbol.id(), value.clone());
        Ok(value)
    }

    fn eval_uncached(&mut self, symbol: &Symbol) -> Result<Value> {
        match symbol.kind() {
            SymbolKind::Scalar(v) => Ok(Value::Scalar(*v)),
            SymbolKind::Vector(entries) => Ok(Value::Vector(entries.clone())),
            SymbolKind::Matrix(m) => Ok(Value::Matrix(m.clone())),
            SymbolKind::Time => match self.t {
                Some(t) => Ok(Value::Scalar(t)),
                None => Err(Error::new(
                    ErrorKind::Model,
                    ErrorCode::MissingTime,
                    Some(format!("'{symbol}' evaluated without a time value")),
                )),
            },
            SymbolKind::StateVector(slice) => match self.y {
                Some(y) => {
                    if slice.end > y.len() {
                        return model_err!(
                            ShapeMismatch,
                            format!(
                                "state slice {}:{} out of bounds for a state vector of length {}",
                                slice.start,
                                slice.end,
                                y.len()
                            )
                        );
                    }
                    Ok(Value::Vector(y[slice.clone()].to_vec()))
                }
                None => Err(Error::new(
                    ErrorKind::Model,
                    ErrorCode::MissingState,
                    Some(format!("'{symbol}' evaluated without a state vector")),
                )),
            },
            SymbolKind::Binary(op, l, r) => {
                let l = self.eval(l)?;
                let r = self.eval(r)?;
                Value::binary(*op, &l, &r)
            }
            SymbolKind::Unary(op, c) => {
                let c = self.eval(c)?;
                Value::unary(*op, &c)
            }
            SymbolKind::Builtin(func, c) => {
                let c = self.eval(c)?;
                Value::builtin(*func, &c)
            }
            SymbolKind::Repeat(c, npts) => {
                let v = match self.eval(c)? {
                    Value::Scalar(v) => v,
                    Value::Vector(entries) if entries.len() == 1 => entries[0],
                    other => {
                        return model_err!(
                            ShapeMismatch,
                            format!("cannot replicate a value of shape {}", other.shape())
                        );
                    }
                };
                Ok(Value::Vector(vec![v; *npts]))
            }
            SymbolKind::FlatConcatenation(children) => {
                if children.is_empty() {
                    return Ok(Value::Vector(vec![]));
                }
                let mut out = Vec::new();
                for child in children {
                    out.extend(self.eval(child)?.into_vector()?);
                }
                Ok(Value::Vector(out))
            }
            SymbolKind::DomainConcatenation(children, slices) => {
                let mut out = vec![0.0; slices.size];
                let own: HashMap<_, _> = slices
                    .own
                    .iter()
                    .map(|(dom, slice)| (dom.clone(), slice.clone()))
                    .collect();
                for (child, child_slices) in children.iter().zip(slices.children.iter()) {
                    let child_vector = self.eval(child)?.into_vector()?;
                    for (dom, child_slice) in child_slices {
                        if child_slice.end > child_vector.len() {
                            return model_err!(
                                ShapeMismatch,
                                format!(
                                    "child '{child}' of shape ({},) too short for its \
                                     '{dom}' slice {}:{}",
                                    child_vector.len(),
                                    child_slice.start,
                                    child_slice.end
                                )
                            );
                        }
                        let dest = &own[dom];
                        out[dest.clone()].copy_from_slice(&child_vector[child_slice.clone()]);
                    }
                }
                Ok(Value::Vector(out))
            }
            // unresolved nodes: these only evaluate after discretisation
            SymbolKind::Parameter(_)
            | SymbolKind::FunctionParameter(_, _)
            | SymbolKind::Variable(_)
            | SymbolKind::SpatialVariable(_)
            | SymbolKind::Spatial(_, _)
            | SymbolKind::BoundaryValue(_, _)
            | SymbolKind::Broadcast(_)
            | SymbolKind::Concatenation(_) => Err(symbol.evaluation_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::BinaryOp;

    #[test]
    fn arithmetic_with_time_and_state() {
        // 2 * t + y[0:3]
        let expr = Symbol::add(
            Symbol::mul(Symbol::scalar(2.0), Symbol::time()).unwrap(),
            Symbol::state_vector(0..3),
        )
        .unwrap();
        let y = [1.0, 2.0, 3.0];
        let out = evaluate(&expr, Some(0.5), Some(&y)).unwrap();
        assert_eq!(Value::Vector(vec![2.0, 3.0, 4.0]), out);
    }

    #[test]
    fn missing_time_and_state_are_errors() {
        let expr = Symbol::time();
        assert!(evaluate(&expr, None, None).is_err());

        let expr = Symbol::state_vector(0..2);
        assert!(evaluate(&expr, Some(0.0), None).is_err());
        // out-of-bounds slice
        let y = [1.0];
        assert!(evaluate(&expr, Some(0.0), Some(&y)).is_err());
    }

    #[test]
    fn flat_concatenation_lifts_numbers() {
        let conc = Symbol::flat_concatenation(vec![
            Symbol::state_vector(0..3),
            Symbol::scalar(16.0),
            Symbol::time(),
        ]);
        let y = [0.1, 0.2, 0.3];
        let out = evaluate(&conc, Some(4.0), Some(&y)).unwrap();
        assert_eq!(Value::Vector(vec![0.1, 0.2, 0.3, 16.0, 4.0]), out);
    }

    #[test]
    fn undiscretised_nodes_do_not_evaluate() {
        let var = Symbol::variable("c", &["negative electrode"]).unwrap();
        let err = evaluate(&var, Some(0.0), None).unwrap_err();
        assert_eq!(ErrorCode::UnresolvedSymbol, err.code);

        let param = Symbol::parameter("k");
        assert!(evaluate(&param, Some(0.0), None).is_err());

        let func = Symbol::function_parameter("diffusivity", Symbol::scalar(0.5));
        assert!(evaluate(&func, Some(0.0), None).is_err());
    }

    #[test]
    fn cache_is_shared_within_an_evaluator() {
        let shared = Symbol::mul(Symbol::scalar(3.0), Symbol::state_vector(0..2)).unwrap();
        let a = Symbol::add(shared.clone(), Symbol::scalar(1.0)).unwrap();
        let b = Symbol::add(shared.clone(), Symbol::scalar(2.0)).unwrap();

        let y = [1.0, 2.0];
        let mut ev = Evaluator::new(Some(0.0), Some(&y));
        assert_eq!(
            Value::Vector(vec![4.0, 7.0]),
            ev.eval(&a).unwrap()
        );
        assert_eq!(
            Value::Vector(vec![5.0, 8.0]),
            ev.eval(&b).unwrap()
        );
        // the shared product was memoised under its structural id
        assert!(ev.cache.contains_key(&shared.id()));
    }

    #[test]
    fn matmul_dispatches_through_binary() {
        let m = Symbol::matrix(crate::sparse::from_triplets(
            2,
            2,
            vec![(0, 0, 1.0), (1, 1, 2.0)],
        ));
        let v = Symbol::state_vector(0..2);
        let expr = Symbol::binary(BinaryOp::MatMul, m, v).unwrap();
        let y = [3.0, 4.0];
        assert_eq!(
            Value::Vector(vec![3.0, 8.0]),
            evaluate(&expr, None, Some(&y)).unwrap()
        );
    }
}
