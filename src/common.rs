// Copyright 2026 The Cellsim Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

/// A plain identifier: a variable, parameter, or spatial-coordinate name.
pub type Ident = String;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    UnknownDomain,
    OverlappingDomains,
    DomainMismatch,
    EmptyDomain,
    UnresolvedSymbol,
    ShapeMismatch,
    InsufficientInitialConditions,
    NonNumericInitialConditions,
    MisalignedSubmeshes,
    MissingTime,
    MissingState,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            UnknownDomain => "unknown_domain",
            OverlappingDomains => "overlapping_domains",
            DomainMismatch => "domain_mismatch",
            EmptyDomain => "empty_domain",
            UnresolvedSymbol => "unresolved_symbol",
            ShapeMismatch => "shape_mismatch",
            InsufficientInitialConditions => "insufficient_initial_conditions",
            NonNumericInitialConditions => "non_numeric_initial_conditions",
            MisalignedSubmeshes => "misaligned_submeshes",
            MissingTime => "missing_time",
            MissingState => "missing_state",
            Generic => "generic",
        };

        write!(f, "{name}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Structural: incompatible or unknown region names.  Never recovered.
    Domain,
    /// Semantic: shape mismatches, insufficient initial conditions.
    Model,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Domain => "DomainError",
            ErrorKind::Model => "ModelError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

#[macro_export]
macro_rules! domain_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Domain,
            ErrorCode::$code,
            Some($str),
        ))
    }}
);

#[macro_export]
macro_rules! model_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Model,
            ErrorCode::$code,
            Some($str),
        ))
    }}
);
