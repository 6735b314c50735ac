#![allow(dead_code, non_snake_case, non_upper_case_globals)]

use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::info;
use tracing_subscriber::EnvFilter;
use open_anneal_sim::{
    bath::OhmicBath,
    hilbert::{ expectation, outer_prod, pauli_x, pauli_z, plus_state },
    solve::{ solve_ame, solve_von_neumann, AmeOptions },
    Annealing,
    CouplingSet,
    Operator,
    SolverConfig,
    Unit,
};

const eta: f64 = 1e-4;
const fc: f64 = 4.0; // GHz
const T: f64 = 16.0; // mK

fn ground_population(H: &Operator, s: f64, rho: &nd::Array2<C64>)
    -> anyhow::Result<f64>
{
    let (_, V) = H.eigen_direct(s, 1)?;
    let g: nd::Array1<C64> = V.column(0).to_owned();
    Ok(expectation(&outer_prod(&g, &g), rho).re)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let H = Operator::annealing(
        |s| 1.0 - s,
        |s| s,
        -pauli_x() / C64::from(2.0),
        -pauli_z() / C64::from(2.0),
        Unit::Linear,
    )?;
    let tf = 10.0 * 2.0_f64.sqrt();
    let annealing
        = Annealing::new(H.clone(), plus_state(1))?
        .with_coupling(CouplingSet::constant([pauli_z()])?)?
        .with_bath(OhmicBath::from_physical(eta, fc, T)?)?;
    let config = SolverConfig::default().with_tolerances(1e-8, 1e-6);

    let closed = solve_von_neumann(&annealing, tf, &config)?;
    let open = solve_ame(&annealing, tf, &AmeOptions::default(), &config)?;

    println!("{:>6}  {:>12}  {:>12}", "s", "closed", "ame");
    for s in nd::Array1::linspace(0.0, 1.0, 11).iter().copied() {
        let p_closed = ground_population(&H, s, &closed.eval(s)?)?;
        let p_open = ground_population(&H, s, &open.eval(s)?)?;
        println!("{:>6.2}  {:>12.8}  {:>12.8}", s, p_closed, p_open);
    }
    info!(
        ground = ground_population(&H, 1.0, &open.eval(1.0)?)?,
        steps = open.t().len(),
        "final AME ground-state population",
    );
    Ok(())
}
