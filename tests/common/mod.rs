// Copyright 2026 The Cellsim Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

// not every test binary uses every helper
#![allow(dead_code)]

use std::collections::HashMap;
use std::rc::Rc;

use cellsim_engine::{
    Discretisation, FiniteVolume, MACROSCALE, Mesh, SpatialMethod, SpatialMethodMap, SubMesh,
    Value,
};

/// A cell mesh: 5 cells in each electrode, 4 in the separator, plus a
/// free-standing 10-cell test domain.
pub fn mesh_for_testing() -> Rc<Mesh> {
    let mut mesh = Mesh::new();
    mesh.add_submeshes("negative electrode", vec![SubMesh::uniform(0.0, 0.3, 5)])
        .unwrap();
    mesh.add_submeshes("separator", vec![SubMesh::uniform(0.3, 0.5, 4)])
        .unwrap();
    mesh.add_submeshes("positive electrode", vec![SubMesh::uniform(0.5, 1.0, 5)])
        .unwrap();
    mesh.add_submeshes("test", vec![SubMesh::uniform(0.0, 1.0, 10)])
        .unwrap();
    Rc::new(mesh)
}

pub fn discretisation_for_testing() -> Discretisation {
    let mesh = mesh_for_testing();
    let fv: Rc<dyn SpatialMethod> = Rc::new(FiniteVolume::new(Rc::clone(&mesh)));
    let mut methods: SpatialMethodMap = HashMap::new();
    methods.insert(MACROSCALE.to_owned(), Rc::clone(&fv));
    methods.insert("test".to_owned(), fv);
    Discretisation::new(mesh, methods)
}

pub fn assert_vec_eq(expected: &[f64], value: &Value) {
    match value {
        Value::Vector(v) => {
            assert_eq!(expected.len(), v.len(), "lengths differ: {value:?}");
            for (i, (e, a)) in expected.iter().zip(v.iter()).enumerate() {
                assert!(
                    (e - a).abs() < 1e-10,
                    "entry {i}: expected {e}, got {a} (full: {v:?})"
                );
            }
        }
        other => panic!("expected a vector, got {other:?}"),
    }
}
