// Copyright 2026 The Cellsim Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;
use std::hint::black_box;
use std::rc::Rc;

use criterion::{Criterion, criterion_group, criterion_main};

use cellsim_engine::{
    BcKind, BoundaryConditions, CompiledModel, Discretisation, DiscretisedModel, FiniteVolume,
    MACROSCALE, Mesh, Model, Side, SpatialMethod, SpatialMethodMap, SubMesh, Symbol, simplify,
};

fn diffusion_model(npts: usize) -> DiscretisedModel {
    let mut mesh = Mesh::new();
    mesh.add_submeshes(
        "negative electrode",
        vec![SubMesh::uniform(0.0, 0.3, npts)],
    )
    .unwrap();
    mesh.add_submeshes("separator", vec![SubMesh::uniform(0.3, 0.5, npts)])
        .unwrap();
    mesh.add_submeshes(
        "positive electrode",
        vec![SubMesh::uniform(0.5, 1.0, npts)],
    )
    .unwrap();
    let mesh = Rc::new(mesh);

    let fv: Rc<dyn SpatialMethod> = Rc::new(FiniteVolume::new(Rc::clone(&mesh)));
    let mut methods: SpatialMethodMap = HashMap::new();
    methods.insert(MACROSCALE.to_owned(), fv);

    let c = Symbol::variable(
        "c",
        &["negative electrode", "separator", "positive electrode"],
    )
    .unwrap();
    let i = Symbol::variable("i", &[]).unwrap();

    let mut model = Model::new();
    model.rhs = vec![(
        c.clone(),
        Symbol::divergence(Symbol::gradient(c.clone()).unwrap()).unwrap(),
    )];
    model.algebraic = vec![(
        i.clone(),
        Symbol::sub(i.clone(), Symbol::scalar(1.0)).unwrap(),
    )];
    model.initial_conditions = vec![
        (c.clone(), Symbol::scalar(1.0)),
        (i.clone(), Symbol::scalar(1.0)),
    ];
    let mut bc = BoundaryConditions::new();
    bc.set(Side::Left, Symbol::scalar(0.0), BcKind::Dirichlet);
    bc.set(Side::Right, Symbol::scalar(1.0), BcKind::Dirichlet);
    model.boundary_conditions = vec![(c.clone(), bc)];

    Discretisation::new(mesh, methods)
        .process_model(&model)
        .unwrap()
}

fn bench_discretise(c: &mut Criterion) {
    c.bench_function("discretise_diffusion_30", |b| {
        b.iter(|| black_box(diffusion_model(10)))
    });
}

fn bench_residual(c: &mut Criterion) {
    let discretised = diffusion_model(40);
    let compiled = CompiledModel::new(&discretised);
    let y0: Vec<f64> = compiled.initial_conditions().to_vec();
    let ydot = vec![0.0; y0.len()];

    c.bench_function("residual_121", |b| {
        b.iter(|| black_box(compiled.residual(0.5, &y0, &ydot).unwrap()))
    });
}

fn bench_simplified_residual(c: &mut Criterion) {
    let mut discretised = diffusion_model(40);
    discretised.concatenated_rhs = simplify(&discretised.concatenated_rhs).unwrap();
    discretised.concatenated_algebraic =
        simplify(&discretised.concatenated_algebraic).unwrap();
    let compiled = CompiledModel::new(&discretised);
    let y0: Vec<f64> = compiled.initial_conditions().to_vec();
    let ydot = vec![0.0; y0.len()];

    c.bench_function("residual_121_simplified", |b| {
        b.iter(|| black_box(compiled.residual(0.5, &y0, &ydot).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_discretise,
    bench_residual,
    bench_simplified_residual
);
criterion_main!(benches);
