//! Special functions.

use num_complex::Complex64 as C64;

/// Complex trigamma function ψ'(z), the second derivative of ln Γ(z).
///
/// Uses the recurrence ψ'(z) = ψ'(z + 1) + 1/z² to shift `z` to the right
/// half-plane, followed by the asymptotic expansion in 1/z. Not defined at the
/// non-positive integers, where the result is non-finite.
pub fn trigamma(z: C64) -> C64 {
    let mut z = z;
    let mut acc = C64::new(0.0, 0.0);
    while z.re < 10.0 {
        acc += (z * z).inv();
        z += 1.0;
    }
    let w = z.inv();
    let w2 = w * w;
    // 1/z + 1/2z² + Σ B_2k / z^(2k+1)
    let series
        = w * (
            1.0 + w * 0.5
            + w2 * (
                1.0 / 6.0
                + w2 * (
                    -1.0 / 30.0
                    + w2 * (
                        1.0 / 42.0
                        + w2 * (-1.0 / 30.0 + w2 * (5.0 / 66.0))
                    )
                )
            )
        );
    acc + series
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn known_real_values() {
        assert_relative_eq!(trigamma(1.0.into()).re, PI * PI / 6.0, max_relative = 1e-13);
        assert_relative_eq!(trigamma(0.5.into()).re, PI * PI / 2.0, max_relative = 1e-13);
        assert_relative_eq!(trigamma(1.0.into()).im, 0.0);
    }

    #[test]
    fn recurrence_off_axis() {
        let z = C64::new(0.3, 2.7);
        let lhs = trigamma(z) - trigamma(z + 1.0);
        let rhs = (z * z).inv();
        assert_relative_eq!(lhs.re, rhs.re, epsilon = 1e-12);
        assert_relative_eq!(lhs.im, rhs.im, epsilon = 1e-12);
    }

    #[test]
    fn conjugate_symmetry() {
        let z = C64::new(1.5, -4.0);
        let a = trigamma(z);
        let b = trigamma(z.conj());
        assert_relative_eq!(a.re, b.re, epsilon = 1e-14);
        assert_relative_eq!(a.im, -b.im, epsilon = 1e-14);
    }

    #[test]
    fn reflection_formula() {
        // ψ'(1 - z) + ψ'(z) = π² / sin²(πz)
        let z = C64::new(0.25, 0.5);
        let lhs = trigamma(z) + trigamma(1.0 - z);
        let s = (z * PI).sin();
        let rhs = PI * PI / (s * s);
        assert_relative_eq!(lhs.re, rhs.re, max_relative = 1e-11);
        assert_relative_eq!(lhs.im, rhs.im, max_relative = 1e-11);
    }
}
