// Copyright 2026 The Cellsim Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Named spatial regions and the fixed global ordering used whenever
//! domain-scoped vectors are concatenated.
//!
//! The ordering is an explicit total order over every region name the engine
//! knows about, fixed at startup.  Concatenation results are sorted by this
//! order, never by the order in which children happen to be supplied.

use lazy_static::lazy_static;

use crate::common::Result;
use crate::domain_err;

/// The name of a spatial region, e.g. `"negative electrode"`.
pub type DomainName = String;

lazy_static! {
    /// Total order over all known region names.
    pub static ref KNOWN_DOMAINS: Vec<&'static str> = vec![
        "negative electrode",
        "separator",
        "positive electrode",
        "whole cell",
        "negative particle",
        "positive particle",
        "current collector",
        "test",
    ];
}

/// The primary electrochemical sub-domains that the reserved `"macroscale"`
/// registry entry expands to.
pub const MACROSCALE_DOMAINS: [&str; 3] =
    ["negative electrode", "separator", "positive electrode"];

/// Position of `name` in the global ordering.
pub fn canonical_order(name: &str) -> Result<usize> {
    match KNOWN_DOMAINS.iter().position(|d| *d == name) {
        Some(idx) => Ok(idx),
        None => domain_err!(UnknownDomain, format!("unknown domain '{name}'")),
    }
}

/// Check every entry of `domain` is a known region name.
pub fn check_known(domain: &[DomainName]) -> Result<()> {
    for name in domain {
        canonical_order(name)?;
    }
    Ok(())
}

/// Sort region names into the global ordering.
pub fn sort_domains(domain: &mut [DomainName]) -> Result<()> {
    check_known(domain)?;
    // unwrap is fine: every name was just checked
    domain.sort_by_key(|d| canonical_order(d).unwrap());
    Ok(())
}

/// Combine the domains of concatenation children: the union must be disjoint,
/// and the result is sorted into the global ordering.
pub fn combine_disjoint(domains: &[&[DomainName]]) -> Result<Vec<DomainName>> {
    let mut combined: Vec<DomainName> = Vec::new();
    for child_domain in domains {
        for name in child_domain.iter() {
            if combined.contains(name) {
                return domain_err!(
                    OverlappingDomains,
                    format!("domain of children must be disjoint, '{name}' repeats")
                );
            }
            combined.push(name.clone());
        }
    }
    sort_domains(&mut combined)?;
    Ok(combined)
}

/// Combine the domains of a binary operator's children: either both sides
/// agree, or one side is domain-independent and takes the other's domain.
pub fn combine_binary(left: &[DomainName], right: &[DomainName]) -> Result<Vec<DomainName>> {
    if left.is_empty() {
        Ok(right.to_vec())
    } else if right.is_empty() || left == right {
        Ok(left.to_vec())
    } else {
        domain_err!(
            DomainMismatch,
            format!("incompatible domains {left:?} and {right:?}")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_total_and_stable() {
        assert_eq!(0, canonical_order("negative electrode").unwrap());
        assert_eq!(1, canonical_order("separator").unwrap());
        assert_eq!(2, canonical_order("positive electrode").unwrap());
        assert!(canonical_order("no such place").is_err());
    }

    #[test]
    fn combine_sorts_by_global_order_not_insertion() {
        let a = vec!["test".to_owned()];
        let b = vec!["negative electrode".to_owned()];
        let c = vec!["separator".to_owned(), "positive electrode".to_owned()];
        let combined =
            combine_disjoint(&[a.as_slice(), b.as_slice(), c.as_slice()]).unwrap();
        assert_eq!(
            vec![
                "negative electrode".to_owned(),
                "separator".to_owned(),
                "positive electrode".to_owned(),
                "test".to_owned(),
            ],
            combined
        );
    }

    #[test]
    fn combine_rejects_overlap() {
        let a = vec!["separator".to_owned()];
        let b = vec!["separator".to_owned(), "positive electrode".to_owned()];
        assert!(combine_disjoint(&[a.as_slice(), b.as_slice()]).is_err());
    }

    #[test]
    fn binary_domains() {
        let neg = vec!["negative electrode".to_owned()];
        let sep = vec!["separator".to_owned()];
        let none: Vec<DomainName> = vec![];

        assert_eq!(neg, combine_binary(&neg, &none).unwrap());
        assert_eq!(neg, combine_binary(&none, &neg).unwrap());
        assert_eq!(neg, combine_binary(&neg, &neg).unwrap());
        assert!(combine_binary(&neg, &sep).is_err());
    }
}
