#![allow(dead_code, non_snake_case, non_upper_case_globals)]

use std::{ f64::consts::PI, sync::Arc };
use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::{ info, warn };
use tracing_subscriber::EnvFilter;
use open_anneal_sim::{
    bath::{ OhmicBath, UleBath, UleOptions },
    hilbert::{ pauli_x, pauli_z, plus_state },
    solve::{
        min_eigenvalue,
        solve_cgme,
        solve_redfield,
        solve_ule,
        solve_unitary,
        CgmeOptions,
        UleSolverOptions,
    },
    Annealing,
    CouplingSet,
    Operator,
    Solution,
    SolverConfig,
    Status,
    Unit,
};

const eta: f64 = 0.1;
const omega_c: f64 = 8.0 * PI; // rad/ns
const beta: f64 = 4.0; // ns
const tf: f64 = 20.0; // ns
const Ta: f64 = 2.0; // ns

fn qubit<B>(bath: B) -> anyhow::Result<Annealing>
where B: Into<open_anneal_sim::Bath>
{
    let H = Operator::constant(pauli_z() / C64::from(2.0), Unit::Angular)?;
    Ok(
        Annealing::new(H, plus_state(1))?
            .with_coupling(CouplingSet::constant([pauli_x()])?)?
            .with_bath(bath)?
    )
}

fn report(label: &str, sol: &Solution<nd::Ix2>) -> anyhow::Result<()> {
    let lowest
        = sol.u().iter()
        .map(min_eigenvalue)
        .collect::<Result<Vec<f64>, _>>()?
        .into_iter()
        .fold(f64::INFINITY, f64::min);
    match sol.status() {
        Status::Solved => {
            info!(solver = label, lowest, steps = sol.t().len(), "completed");
        },
        Status::Halted { t, reason } => {
            warn!(solver = label, s = t, %reason, lowest, "halted");
        },
    }
    let rho00 = sol.last().map_or(f64::NAN, |rho| rho[[0, 0]].re);
    println!("{:>10}  {:>14.6e}  {:>8.4}  {:?}", label, lowest, rho00, sol.status());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let ohmic = OhmicBath::new(eta, omega_c, beta)?;
    let annealing = qubit(ohmic.clone())?;
    let U = solve_unitary(&annealing, tf, &SolverConfig::default())?;

    println!("{:>10}  {:>14}  {:>8}  {}", "solver", "min eigval", "ρ00", "status");

    let config = SolverConfig::default().with_positivity_check(1e-6);
    let redfield = solve_redfield(&annealing, tf, &U, Ta, &config)?;
    report("redfield", &redfield)?;

    let config = SolverConfig::cgme().with_positivity_check(1e-4);
    let cgme = solve_cgme(&annealing, tf, &U, &CgmeOptions::default().with_window(Ta), &config)?;
    report("cgme", &cgme)?;

    let ule_bath = UleBath::new(Arc::new(ohmic), UleOptions::new(6.0, 40.0 * omega_c))?;
    let annealing = qubit(ule_bath)?;
    let config = SolverConfig::default().with_positivity_check(1e-6);
    let ule = solve_ule(&annealing, tf, &U, &UleSolverOptions::default(), &config)?;
    report("ule", &ule)?;
    Ok(())
}
