#![allow(dead_code, non_snake_case, non_upper_case_globals)]

use ndarray as nd;
use tracing::info;
use tracing_subscriber::EnvFilter;
use open_anneal_sim::{
    bath::FluctuatorEnsemble,
    hilbert::{ expectation_pure, pauli_x, pauli_z, plus_state },
    Annealing,
    CouplingSet,
    EnsembleKind,
    EnsembleOptions,
    Operator,
    Strategy,
    Unit,
    build_ensembles,
};

const num_fluct: usize = 10;
const b: f64 = 0.2; // rad/ns
const gamma_min: f64 = 1e-2; // 1/ns
const gamma_max: f64 = 10.0; // 1/ns
const tf: f64 = 10.0; // ns
const ntraj: usize = 1000;
const seed: u64 = 10101;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let fluctuators = FluctuatorEnsemble::one_over_f(num_fluct, b, gamma_min, gamma_max)?;
    let H = Operator::constant(nd::Array2::zeros((2, 2)), Unit::Angular)?;
    let annealing
        = Annealing::new(H, plus_state(1))?
        .with_coupling(CouplingSet::constant([pauli_z()])?)?
        .with_bath(fluctuators)?;

    let builder = build_ensembles(
        &annealing, tf, EnsembleKind::Stochastic,
        EnsembleOptions::default().with_seed(seed),
    )?;
    let ensemble = builder.run(ntraj, Strategy::Threads)?;
    info!(trajectories = ensemble.len(), "ensemble solved");

    let ts: Vec<f64> = nd::Array1::linspace(0.0, 1.0, 21).to_vec();
    let stats = ensemble.statistics(&ts, |psi| expectation_pure(&pauli_x(), psi).re)?;
    println!("{:>8}  {:>12}  {:>12}", "t (ns)", "<σx>", "sem");
    for ((s, m), e) in ts.iter().zip(&stats.mean).zip(&stats.sem) {
        println!("{:>8.3}  {:>12.6}  {:>12.6}", tf * s, m, e);
    }
    Ok(())
}
