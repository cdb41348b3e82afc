// Copyright 2026 The Cellsim Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The minimal mesh contract the discretiser needs: for each named region, an
//! ordered list of 1-D submeshes exposing cell-centre nodes, cell edges and
//! point counts.  A domain backed by more than one submesh repeats the same
//! primary mesh along a secondary dimension (e.g. one particle mesh per
//! electrode location).
//!
//! Meshes are produced once and treated as immutable; mutating one after
//! discretisation invalidates every model discretised against it.

use std::collections::HashMap;

use crate::common::Result;
use crate::domain::{self, DomainName};
use crate::{domain_err, model_err};

/// A 1-D cell-centred submesh: `npts` cells, `npts + 1` edges.
#[derive(Clone, PartialEq, Debug)]
pub struct SubMesh {
    /// Cell-centre positions.
    pub nodes: Vec<f64>,
    /// Cell-edge positions, one more than `nodes`.
    pub edges: Vec<f64>,
    pub npts: usize,
    /// How many entries a field broadcast over this submesh occupies.
    pub npts_for_broadcast: usize,
}

impl SubMesh {
    /// Build a submesh from its edges; nodes are the cell midpoints.
    pub fn new(edges: Vec<f64>) -> SubMesh {
        let npts = edges.len().saturating_sub(1);
        let nodes = edges
            .windows(2)
            .map(|w| (w[0] + w[1]) / 2.0)
            .collect::<Vec<f64>>();
        SubMesh {
            nodes,
            edges,
            npts,
            npts_for_broadcast: npts,
        }
    }

    /// A uniform submesh of `npts` cells spanning `[lower, upper]`.
    pub fn uniform(lower: f64, upper: f64, npts: usize) -> SubMesh {
        let width = (upper - lower) / npts as f64;
        let edges = (0..=npts).map(|i| lower + width * i as f64).collect();
        SubMesh::new(edges)
    }

    /// Spacing between adjacent nodes, `npts - 1` entries.
    pub fn d_nodes(&self) -> Vec<f64> {
        self.nodes.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Cell widths, `npts` entries.
    pub fn d_edges(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct Mesh {
    submeshes: HashMap<DomainName, Vec<SubMesh>>,
}

impl Mesh {
    pub fn new() -> Mesh {
        Mesh {
            submeshes: HashMap::new(),
        }
    }

    /// Register the ordered submesh list for a known region name.
    pub fn add_submeshes(&mut self, domain: &str, submeshes: Vec<SubMesh>) -> Result<()> {
        domain::canonical_order(domain)?;
        if submeshes.is_empty() {
            return model_err!(
                Generic,
                format!("domain '{domain}' needs at least one submesh")
            );
        }
        self.submeshes.insert(domain.to_owned(), submeshes);
        Ok(())
    }

    pub fn get(&self, domain: &str) -> Result<&[SubMesh]> {
        match self.submeshes.get(domain) {
            Some(submeshes) => Ok(submeshes),
            None => domain_err!(UnknownDomain, format!("no mesh for domain '{domain}'")),
        }
    }

    /// Total broadcast size of a field over `domains`, counting every
    /// submesh along the secondary dimension.
    pub fn npts_for_broadcast(&self, domains: &[DomainName]) -> Result<usize> {
        let mut npts = 0;
        for dom in domains {
            for submesh in self.get(dom)? {
                npts += submesh.npts_for_broadcast;
            }
        }
        Ok(npts)
    }

    /// Join the primary submeshes of adjacent domains into a single submesh.
    /// The joined domains must share edges where they meet.
    pub fn combine_submeshes(&self, domains: &[DomainName]) -> Result<SubMesh> {
        if domains.is_empty() {
            return domain_err!(
                EmptyDomain,
                "cannot combine submeshes of an empty domain list".to_owned()
            );
        }
        let mut edges: Vec<f64> = self.get(&domains[0])?[0].edges.clone();
        for dom in &domains[1..] {
            let submesh = &self.get(dom)?[0];
            let boundary = *edges.last().unwrap();
            if (submesh.edges[0] - boundary).abs() > 1e-12 * boundary.abs().max(1.0) {
                return model_err!(
                    MisalignedSubmeshes,
                    format!(
                        "submeshes for {domains:?} do not line up at '{dom}': {} vs {}",
                        boundary, submesh.edges[0]
                    )
                );
            }
            edges.extend_from_slice(&submesh.edges[1..]);
        }
        Ok(SubMesh::new(edges))
    }
}
