// Copyright 2026 The Cellsim Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Runtime values produced by evaluating an expression tree: a single number,
//! a dense column vector, or a sparse matrix.  Elementwise arithmetic
//! broadcasts scalars against vectors; everything else must agree in shape.

use sprs::CsMat;

use crate::common::Result;
use crate::model_err;
use crate::sparse;
use crate::symbol::{BinaryOp, BuiltinFn, UnaryOp};

#[derive(Clone, PartialEq, Debug)]
pub enum Value {
    Scalar(f64),
    Vector(Vec<f64>),
    Matrix(CsMat<f64>),
}

impl Value {
    /// Human-readable shape for error messages.
    pub fn shape(&self) -> String {
        match self {
            Value::Scalar(_) => "scalar".to_owned(),
            Value::Vector(v) => format!("({},)", v.len()),
            Value::Matrix(m) => format!("({}, {})", m.rows(), m.cols()),
        }
    }

    /// Length of the flattened value; a scalar counts as a single entry.
    pub fn len(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Vector(v) => v.len(),
            Value::Matrix(m) => m.rows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value as a dense vector; errors on matrices.
    pub fn into_vector(self) -> Result<Vec<f64>> {
        match self {
            Value::Scalar(v) => Ok(vec![v]),
            Value::Vector(v) => Ok(v),
            Value::Matrix(m) => model_err!(
                ShapeMismatch,
                format!("expected a vector, got a {}x{} matrix", m.rows(), m.cols())
            ),
        }
    }

    pub fn unary(op: UnaryOp, operand: &Value) -> Result<Value> {
        let f = match op {
            UnaryOp::Neg => |v: f64| -v,
            UnaryOp::Abs => f64::abs,
        };
        operand.map(f)
    }

    pub fn builtin(func: BuiltinFn, operand: &Value) -> Result<Value> {
        let f = match func {
            BuiltinFn::Exp => f64::exp,
            BuiltinFn::Ln => f64::ln,
            BuiltinFn::Sqrt => f64::sqrt,
            BuiltinFn::Sin => f64::sin,
            BuiltinFn::Cos => f64::cos,
            BuiltinFn::Tanh => f64::tanh,
        };
        operand.map(f)
    }

    fn map(&self, f: impl Fn(f64) -> f64) -> Result<Value> {
        match self {
            Value::Scalar(v) => Ok(Value::Scalar(f(*v))),
            Value::Vector(v) => Ok(Value::Vector(v.iter().copied().map(f).collect())),
            Value::Matrix(m) => Ok(Value::Matrix(m.map(|v| f(*v)))),
        }
    }

    /// Apply an elementwise binary operation, broadcasting scalars.
    pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
        if op == BinaryOp::MatMul {
            return Value::matmul(left, right);
        }
        let f = |l: f64, r: f64| match op {
            BinaryOp::Add => l + r,
            BinaryOp::Sub => l - r,
            BinaryOp::Mul => l * r,
            BinaryOp::Div => l / r,
            BinaryOp::Pow => l.powf(r),
            BinaryOp::MatMul => unreachable!(),
        };
        match (left, right) {
            (Value::Scalar(l), Value::Scalar(r)) => Ok(Value::Scalar(f(*l, *r))),
            (Value::Scalar(l), Value::Vector(r)) => {
                Ok(Value::Vector(r.iter().map(|r| f(*l, *r)).collect()))
            }
            (Value::Vector(l), Value::Scalar(r)) => {
                Ok(Value::Vector(l.iter().map(|l| f(*l, *r)).collect()))
            }
            (Value::Vector(l), Value::Vector(r)) => {
                // length-1 vectors broadcast like scalars
                if l.len() == 1 && r.len() != 1 {
                    return Ok(Value::Vector(r.iter().map(|r| f(l[0], *r)).collect()));
                }
                if r.len() == 1 && l.len() != 1 {
                    return Ok(Value::Vector(l.iter().map(|l| f(*l, r[0])).collect()));
                }
                if l.len() != r.len() {
                    return model_err!(
                        ShapeMismatch,
                        format!(
                            "elementwise op on vectors of length {} and {}",
                            l.len(),
                            r.len()
                        )
                    );
                }
                Ok(Value::Vector(
                    l.iter().zip(r.iter()).map(|(l, r)| f(*l, *r)).collect(),
                ))
            }
            (Value::Matrix(l), Value::Matrix(r))
                if op == BinaryOp::Add || op == BinaryOp::Sub =>
            {
                if l.shape() != r.shape() {
                    return model_err!(
                        ShapeMismatch,
                        format!("matrix op on shapes {} and {}", left.shape(), right.shape())
                    );
                }
                let r = if op == BinaryOp::Sub {
                    r.map(|v| -v)
                } else {
                    r.clone()
                };
                Ok(Value::Matrix(l + &r))
            }
            (Value::Matrix(m), Value::Scalar(s)) | (Value::Scalar(s), Value::Matrix(m))
                if op == BinaryOp::Mul =>
            {
                Ok(Value::Matrix(m.map(|v| v * s)))
            }
            _ => model_err!(
                ShapeMismatch,
                format!(
                    "unsupported elementwise operands {} and {}",
                    left.shape(),
                    right.shape()
                )
            ),
        }
    }

    fn matmul(left: &Value, right: &Value) -> Result<Value> {
        match (left, right) {
            (Value::Matrix(l), Value::Vector(r)) => Ok(Value::Vector(sparse::mul_vec(l, r)?)),
            (Value::Matrix(l), Value::Scalar(r)) => {
                // a 1-column matrix against a scalar state entry
                if l.cols() == 1 {
                    Ok(Value::Vector(sparse::mul_vec(l, &[*r])?))
                } else {
                    model_err!(
                        ShapeMismatch,
                        format!("cannot multiply {} by a scalar", left.shape())
                    )
                }
            }
            (Value::Matrix(l), Value::Matrix(r)) => {
                if l.cols() != r.rows() {
                    return model_err!(
                        ShapeMismatch,
                        format!(
                            "matrix product of shapes {} and {}",
                            left.shape(),
                            right.shape()
                        )
                    );
                }
                Ok(Value::Matrix(l * r))
            }
            _ => model_err!(
                ShapeMismatch,
                format!(
                    "matrix product needs a matrix left operand, got {} @ {}",
                    left.shape(),
                    right.shape()
                )
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    #[test]
    fn scalar_broadcasting() {
        let l = Value::Scalar(2.0);
        let r = Value::Vector(vec![1.0, 2.0, 3.0]);
        assert_eq!(
            Value::Vector(vec![2.0, 4.0, 6.0]),
            Value::binary(BinaryOp::Mul, &l, &r).unwrap()
        );
        assert_eq!(
            Value::Vector(vec![-1.0, 0.0, 1.0]),
            Value::binary(BinaryOp::Sub, &r, &l).unwrap()
        );
    }

    #[test]
    fn vector_lengths_must_agree() {
        let l = Value::Vector(vec![1.0, 2.0]);
        let r = Value::Vector(vec![1.0, 2.0, 3.0]);
        assert!(Value::binary(BinaryOp::Add, &l, &r).is_err());
    }

    #[test]
    fn matvec() {
        let m = Value::Matrix(sparse::from_triplets(
            2,
            3,
            vec![(0, 0, 1.0), (0, 2, 2.0), (1, 1, 3.0)],
        ));
        let v = Value::Vector(vec![1.0, 2.0, 3.0]);
        assert_eq!(
            Value::Vector(vec![7.0, 6.0]),
            Value::binary(BinaryOp::MatMul, &m, &v).unwrap()
        );
        // mismatched inner dimension
        let short = Value::Vector(vec![1.0]);
        assert!(Value::binary(BinaryOp::MatMul, &m, &short).is_err());
    }

    #[test]
    fn builtins_apply_elementwise() {
        let v = Value::Vector(vec![0.0, 1.0]);
        let out = Value::builtin(BuiltinFn::Exp, &v).unwrap();
        if let Value::Vector(out) = out {
            assert!(approx_eq!(f64, 1.0, out[0]));
            assert!(approx_eq!(f64, std::f64::consts::E, out[1]));
        } else {
            panic!("expected vector");
        }
    }
}
