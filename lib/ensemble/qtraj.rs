//! Quantum-jump unraveling of the adiabatic master equation.
//!
//! Between jumps the unnormalized state evolves under
//! `H_eff = H + H_LS - (i/2) Σ L†L`, all diagonal in the instantaneous
//! eigenbasis apart from `H`. A jump happens when `‖ψ‖²` falls below a
//! uniform random threshold; the jump time is located by bisection on the
//! integrator's dense output and the channel is drawn with probability
//! proportional to `‖Lψ‖²`.

use ndarray as nd;
use num_complex::Complex64 as C64;
use rand::{ rngs::StdRng, Rng };
use tracing::trace;
use crate::{
    error::{ Error, Result },
    ode::{ OdeSystem, State, Step, StepAction },
    solve::{ ame::AmeModel, schrodinger::apply_pulses, Pulse },
};

const BISECTION_ITERS: usize = 60;

pub(crate) struct JumpSystem<'a> {
    pub(crate) model: AmeModel,
    pub(crate) tf: f64,
    pub(crate) pulses: &'a [Pulse],
    pub(crate) rng: StdRng,
    pub(crate) threshold: f64,
    pub(crate) jumps: usize,
}

impl<'a> JumpSystem<'a> {
    pub(crate) fn new(model: AmeModel, tf: f64, pulses: &'a [Pulse], mut rng: StdRng)
        -> Self
    {
        let threshold: f64 = rng.gen();
        Self { model, tf, pulses, rng, threshold, jumps: 0 }
    }

    fn jump(&mut self, s: f64, psi: &nd::Array1<C64>) -> Result<nd::Array1<C64>> {
        let frame = self.model.frame(s)?;
        let V = &frame.V;
        let c: nd::Array1<C64> = V.t().mapv(|a| a.conj()).dot(psi);
        // (weight, post-jump state)
        let mut candidates: Vec<(f64, nd::Array1<C64>)> = Vec::new();
        for ch in frame.channels.iter() {
            for ((a, b), &g) in ch.G.indexed_iter() {
                if a == b || g <= 0.0 { continue; }
                let w = g * c[b].norm_sqr();
                if w > 0.0 {
                    let amp = ch.A[[a, b]] * c[b];
                    candidates.push((w, V.column(a).mapv(|x| x * amp)));
                }
            }
            if frame.gamma0 > 0.0 {
                let dc: nd::Array1<C64> = &c * &ch.d.mapv(C64::from);
                let w = frame.gamma0 * dc.iter().map(|x| x.norm_sqr()).sum::<f64>();
                if w > 0.0 { candidates.push((w, V.dot(&dc))); }
            }
        }
        let total: f64 = candidates.iter().map(|(w, _)| w).sum();
        if !(total > 0.0) {
            return Err(Error::Convergence {
                t: s,
                reason: "norm decayed with no available jump".into(),
            });
        }
        let mut x = self.rng.gen::<f64>() * total;
        let mut chosen = candidates.len() - 1;
        for (k, (w, _)) in candidates.iter().enumerate() {
            if x < *w { chosen = k; break; }
            x -= w;
        }
        let (_, new) = candidates.swap_remove(chosen);
        let norm = new.iter().map(|x| x.norm_sqr()).sum::<f64>().sqrt();
        Ok(new / C64::from(norm))
    }
}

impl<'a> OdeSystem<nd::Ix1> for JumpSystem<'a> {
    fn rhs(&mut self, s: f64, psi: &State<nd::Ix1>) -> Result<State<nd::Ix1>> {
        let frame = self.model.frame(s)?;
        let decay = frame.decay();
        let H_eff
            = self.model.H.evaluate(s)
            + frame.lift(
                frame.lamb.iter().zip(decay.iter())
                .map(|(&l, &k)| C64::new(l, -k / 2.0))
            );
        Ok(H_eff.dot(psi) * C64::new(0.0, -self.tf))
    }

    fn on_step(&mut self, step: &Step<nd::Ix1>) -> Result<StepAction<nd::Ix1>> {
        let norm2 = |psi: &nd::Array1<C64>| psi.iter().map(|x| x.norm_sqr()).sum::<f64>();
        if norm2(step.u1) >= self.threshold {
            return Ok(StepAction::Continue);
        }
        let (mut lo, mut hi) = (step.t0, step.t1);
        for _ in 0..BISECTION_ITERS {
            let mid = (lo + hi) / 2.0;
            if mid <= lo || mid >= hi { break; }
            if norm2(&step.interpolate(mid)) >= self.threshold { lo = mid; } else { hi = mid; }
        }
        let psi = step.interpolate(hi);
        let state = self.jump(hi, &psi)?;
        self.threshold = self.rng.gen();
        self.jumps += 1;
        trace!(s = hi, jumps = self.jumps, "quantum jump");
        Ok(StepAction::Reset { t: hi, state })
    }

    fn on_tstop(&mut self, s: f64, psi: &mut State<nd::Ix1>) -> Result<bool> {
        apply_pulses(self.pulses, s, psi)
    }
}
