//! Reference quadrature rules of arbitrary degree.
//!
//! Simplex rules are collapsed tensor products of Gauss-Legendre rules.

use std::f64::consts::PI;

/// Gauss-Legendre points and weights on `[-1, 1]`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn gauss_legendre(n: usize) -> Vec<(f64, f64)> {
    let n = n.max(1);
    let nf = n as f64;
    let mut rule = Vec::with_capacity(n);
    for i in 0..n {
        let mut x = (PI * (i as f64 + 0.75) / (nf + 0.5)).cos();
        let mut derivative = 1.0;
        for _ in 0..100 {
            let (value, d) = legendre(n, x);
            derivative = d;
            let dx = value / d;
            x -= dx;
            if dx.abs() <= 1e-16 {
                break;
            }
        }
        let (_, d) = legendre(n, x);
        if d.is_finite() {
            derivative = d;
        }
        rule.push((x, 2.0 / ((1.0 - x * x) * derivative * derivative)));
    }
    rule
}

/// Legendre polynomial `P_n(x)` and its derivative.
#[allow(clippy::cast_precision_loss)]
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = x;
    for k in 2..=n {
        let kf = k as f64;
        let p2 = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        p0 = p1;
        p1 = p2;
    }
    let derivative = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, derivative)
}

/// Points per direction so a collapsed rule integrates `degree` exactly.
fn collapsed_points(degree: usize) -> usize {
    degree / 2 + 2
}

/// Gauss rule on `[0, 1]` exact for polynomials of `degree`.
#[must_use]
pub fn line_rule(degree: usize) -> Vec<(f64, f64)> {
    gauss_legendre(degree / 2 + 1)
        .into_iter()
        .map(|(x, w)| (0.5 * (x + 1.0), 0.5 * w))
        .collect()
}

/// Rule on the reference triangle `(0,0), (1,0), (0,1)`; weights sum to 1/2.
#[must_use]
pub fn triangle_rule(degree: usize) -> Vec<([f64; 2], f64)> {
    let base = gauss_legendre(collapsed_points(degree));
    let mut rule = Vec::with_capacity(base.len() * base.len());
    for &(xu, wu) in &base {
        let u = 0.5 * (xu + 1.0);
        for &(xv, wv) in &base {
            let v = 0.5 * (xv + 1.0);
            let jac = 1.0 - u;
            rule.push(([u, v * (1.0 - u)], 0.25 * wu * wv * jac));
        }
    }
    rule
}

/// Rule on the reference tetrahedron; weights sum to 1/6.
#[must_use]
pub fn tet_rule(degree: usize) -> Vec<([f64; 3], f64)> {
    let base = gauss_legendre(collapsed_points(degree));
    let mut rule = Vec::with_capacity(base.len().pow(3));
    for &(xu, wu) in &base {
        let u = 0.5 * (xu + 1.0);
        for &(xv, wv) in &base {
            let v = 0.5 * (xv + 1.0);
            for &(xw, ww) in &base {
                let w = 0.5 * (xw + 1.0);
                let jac = (1.0 - u) * (1.0 - u) * (1.0 - v);
                let point = [u, v * (1.0 - u), w * (1.0 - u) * (1.0 - v)];
                rule.push((point, 0.125 * wu * wv * ww * jac));
            }
        }
    }
    rule
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauss_legendre_integrates_monomials() {
        for n in 1..8 {
            let rule = gauss_legendre(n);
            assert_eq!(rule.len(), n);
            for k in 0..2 * n {
                let exact = if k % 2 == 0 { 2.0 / (k as f64 + 1.0) } else { 0.0 };
                let sum: f64 = rule.iter().map(|(x, w)| w * x.powi(k as i32)).sum();
                assert!((sum - exact).abs() < 1e-13, "n={n} k={k}");
            }
        }
    }

    #[test]
    fn triangle_rule_exact() {
        // Integral of r^a s^b over the reference triangle is a! b! / (a + b + 2)!.
        let rule = triangle_rule(4);
        let total: f64 = rule.iter().map(|(_, w)| w).sum();
        assert!((total - 0.5).abs() < 1e-14);
        let r2s2: f64 = rule.iter().map(|(p, w)| w * p[0] * p[0] * p[1] * p[1]).sum();
        assert!((r2s2 - 4.0 / 720.0).abs() < 1e-14);
    }

    #[test]
    fn tet_rule_exact() {
        let rule = tet_rule(3);
        let total: f64 = rule.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0 / 6.0).abs() < 1e-14);
        // Integral of x y z over the reference tetrahedron is 1/720.
        let xyz: f64 = rule.iter().map(|(p, w)| w * p[0] * p[1] * p[2]).sum();
        assert!((xyz - 1.0 / 720.0).abs() < 1e-15);
        let x3: f64 = rule.iter().map(|(p, w)| w * p[0].powi(3)).sum();
        assert!((x3 - 1.0 / 120.0).abs() < 1e-15);
    }

    #[test]
    fn line_rule_on_unit_interval() {
        let rule = line_rule(5);
        let x5: f64 = rule.iter().map(|(x, w)| w * x.powi(5)).sum();
        assert!((x5 - 1.0 / 6.0).abs() < 1e-15);
    }
}
