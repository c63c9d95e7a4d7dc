//! # Elliptic integrals and Jacobi elliptic functions
//!
//! Incomplete Legendre elliptic integrals of the three kinds, the complete
//! integrals, and the Jacobi amplitude functions `sn`, `cn`, `dn`. These are
//! the special functions behind the closed-form rigid-body rotation solver.
//!
//! Conventions
//! -----------------
//! * All functions take the **complementary parameter** `mc = 1 - m`, where
//!   `m = k²` is the parameter; this matches the convention of the rotation
//!   solver, whose regime constants produce `mc` directly.
//! * `elliptic_pi` uses the characteristic sign convention
//!   `Π(n; φ | m) = ∫₀^φ dθ / ((1 - n sin²θ) √(1 - m sin²θ))`.
//! * Amplitudes are unrestricted: the quasi-periodicity
//!   `F(φ + kπ | m) = 2kK(m) + F(φ | m)` (and its analogues for `E` and `Π`)
//!   reduces any real amplitude to the first quadrant.
//!
//! The incomplete integrals are evaluated through the Carlson symmetric
//! forms `R_F`, `R_D`, `R_J`, `R_C` with the standard duplication
//! iterations; the Jacobi functions use the descending Landen
//! transformation, with the hyperbolic limit at `mc = 0` and the
//! reciprocal-parameter branch for `mc < 0`.

use std::f64::consts::PI;

/// Convergence control for the `R_F` duplication; the truncation error goes
/// as the sixth power of this bound.
const RF_ERRTOL: f64 = 0.0025;
const RD_ERRTOL: f64 = 0.0015;
const RJ_ERRTOL: f64 = 0.0015;
const RC_ERRTOL: f64 = 0.0012;

/// Accuracy of the Landen descent; the error of the result is of order
/// `CA²`, full double precision.
const CA: f64 = 1.0e-8;

/// Carlson's degenerate symmetric integral `R_C(x, y)`.
///
/// `x` must be nonnegative; negative `y` yields the Cauchy principal value.
fn carlson_rc(x: f64, y: f64) -> f64 {
    debug_assert!(x >= 0.0 && y != 0.0);
    let (mut xt, mut yt, w) = if y > 0.0 {
        (x, y, 1.0)
    } else {
        (x - y, -y, x.sqrt() / (x - y).sqrt())
    };
    let mut ave;
    let mut s;
    loop {
        let alamb = 2.0 * xt.sqrt() * yt.sqrt() + yt;
        xt = 0.25 * (xt + alamb);
        yt = 0.25 * (yt + alamb);
        ave = (xt + yt + yt) / 3.0;
        s = (yt - ave) / ave;
        if s.abs() <= RC_ERRTOL {
            break;
        }
    }
    let (c1, c2, c3, c4) = (0.3, 1.0 / 7.0, 0.375, 9.0 / 22.0);
    w * (1.0 + s * s * (c1 + s * (c2 + s * (c3 + s * c4)))) / ave.sqrt()
}

/// Carlson's symmetric integral of the first kind `R_F(x, y, z)`.
///
/// Arguments must be nonnegative with at most one of them zero.
fn carlson_rf(x: f64, y: f64, z: f64) -> f64 {
    debug_assert!(x >= 0.0 && y >= 0.0 && z >= 0.0);
    debug_assert!(x + y > 0.0 && x + z > 0.0 && y + z > 0.0);
    let (mut xt, mut yt, mut zt) = (x, y, z);
    let mut ave;
    let mut delx;
    let mut dely;
    let mut delz;
    loop {
        let sqrtx = xt.sqrt();
        let sqrty = yt.sqrt();
        let sqrtz = zt.sqrt();
        let alamb = sqrtx * (sqrty + sqrtz) + sqrty * sqrtz;
        xt = 0.25 * (xt + alamb);
        yt = 0.25 * (yt + alamb);
        zt = 0.25 * (zt + alamb);
        ave = (xt + yt + zt) / 3.0;
        delx = (ave - xt) / ave;
        dely = (ave - yt) / ave;
        delz = (ave - zt) / ave;
        if delx.abs().max(dely.abs()).max(delz.abs()) <= RF_ERRTOL {
            break;
        }
    }
    let e2 = delx * dely - delz * delz;
    let e3 = delx * dely * delz;
    let (c1, c2, c3, c4) = (1.0 / 24.0, 0.1, 3.0 / 44.0, 1.0 / 14.0);
    (1.0 + (c1 * e2 - c2 - c3 * e3) * e2 + c4 * e3) / ave.sqrt()
}

/// Carlson's symmetric integral of the second kind `R_D(x, y, z)`.
///
/// `x`, `y` nonnegative, at most one zero; `z` positive.
fn carlson_rd(x: f64, y: f64, z: f64) -> f64 {
    debug_assert!(x >= 0.0 && y >= 0.0 && x + y > 0.0 && z > 0.0);
    let (mut xt, mut yt, mut zt) = (x, y, z);
    let mut sum = 0.0;
    let mut fac = 1.0;
    let mut ave;
    let mut delx;
    let mut dely;
    let mut delz;
    loop {
        let sqrtx = xt.sqrt();
        let sqrty = yt.sqrt();
        let sqrtz = zt.sqrt();
        let alamb = sqrtx * (sqrty + sqrtz) + sqrty * sqrtz;
        sum += fac / (sqrtz * (zt + alamb));
        fac *= 0.25;
        xt = 0.25 * (xt + alamb);
        yt = 0.25 * (yt + alamb);
        zt = 0.25 * (zt + alamb);
        ave = 0.2 * (xt + yt + 3.0 * zt);
        delx = (ave - xt) / ave;
        dely = (ave - yt) / ave;
        delz = (ave - zt) / ave;
        if delx.abs().max(dely.abs()).max(delz.abs()) <= RD_ERRTOL {
            break;
        }
    }
    let (c1, c2, c3, c4) = (3.0 / 14.0, 1.0 / 6.0, 9.0 / 22.0, 3.0 / 26.0);
    let c5 = 0.25 * c3;
    let c6 = 1.5 * c4;
    let ea = delx * dely;
    let eb = delz * delz;
    let ec = ea - eb;
    let ed = ea - 6.0 * eb;
    let ee = ed + ec + ec;
    3.0 * sum
        + fac
            * (1.0 + ed * (-c1 + c5 * ed - c6 * delz * ee)
                + delz * (c2 * ee + delz * (-c3 * ec + delz * c4 * ea)))
            / (ave * ave.sqrt())
}

/// Carlson's symmetric integral of the third kind `R_J(x, y, z, p)`.
///
/// `x`, `y`, `z` nonnegative with at most one zero; `p` nonzero (negative
/// `p` yields the Cauchy principal value).
fn carlson_rj(x: f64, y: f64, z: f64, p: f64) -> f64 {
    debug_assert!(x >= 0.0 && y >= 0.0 && z >= 0.0 && p != 0.0);
    debug_assert!(x + y > 0.0 && x + z > 0.0 && y + z > 0.0);
    let mut xt;
    let mut yt;
    let mut zt;
    let mut pt;
    let a;
    let b;
    let rcx;
    if p > 0.0 {
        xt = x;
        yt = y;
        zt = z;
        pt = p;
        a = 0.0;
        b = 0.0;
        rcx = 0.0;
    } else {
        xt = x.min(y).min(z);
        zt = x.max(y).max(z);
        yt = x + y + z - xt - zt;
        a = 1.0 / (yt - p);
        b = a * (zt - yt) * (yt - xt);
        pt = yt + b;
        let rho = xt * zt / yt;
        let tau = p * pt / yt;
        rcx = carlson_rc(rho, tau);
    }
    let mut sum = 0.0;
    let mut fac = 1.0;
    let mut ave;
    let mut delx;
    let mut dely;
    let mut delz;
    let mut delp;
    loop {
        let sqrtx = xt.sqrt();
        let sqrty = yt.sqrt();
        let sqrtz = zt.sqrt();
        let alamb = sqrtx * (sqrty + sqrtz) + sqrty * sqrtz;
        let alpha = (pt * (sqrtx + sqrty + sqrtz) + sqrtx * sqrty * sqrtz).powi(2);
        let beta = pt * (pt + alamb).powi(2);
        sum += fac * carlson_rc(alpha, beta);
        fac *= 0.25;
        xt = 0.25 * (xt + alamb);
        yt = 0.25 * (yt + alamb);
        zt = 0.25 * (zt + alamb);
        pt = 0.25 * (pt + alamb);
        ave = 0.2 * (xt + yt + zt + pt + pt);
        delx = (ave - xt) / ave;
        dely = (ave - yt) / ave;
        delz = (ave - zt) / ave;
        delp = (ave - pt) / ave;
        if delx
            .abs()
            .max(dely.abs())
            .max(delz.abs())
            .max(delp.abs())
            <= RJ_ERRTOL
        {
            break;
        }
    }
    let (c1, c2, c3, c4) = (3.0 / 14.0, 1.0 / 3.0, 3.0 / 22.0, 3.0 / 26.0);
    let c5 = 0.75 * c3;
    let c6 = 1.5 * c4;
    let c7 = 0.5 * c2;
    let c8 = c3 + c3;
    let ea = delx * (dely + delz) + dely * delz;
    let eb = delx * dely * delz;
    let ec = delp * delp;
    let ed = ea - 3.0 * ec;
    let ee = eb + 2.0 * delp * (ea - ec);
    let mut ans = 3.0 * sum
        + fac
            * (1.0 + ed * (-c1 + c5 * ed - c6 * ee)
                + eb * (c7 + delp * (-c8 + delp * c4))
                + delp * ea * (c2 - delp * c3)
                - c2 * delp * ec)
            / (ave * ave.sqrt());
    if p <= 0.0 {
        ans = a * (b * ans + 3.0 * (rcx - carlson_rf(xt, yt, zt)));
    }
    ans
}

/// Splits `φ` into `kπ + φr` with `φr ∈ [-π/2, π/2]`.
fn reduce_amplitude(phi: f64) -> (f64, f64) {
    let k = (phi / PI).round();
    (k, phi - k * PI)
}

/// Complete elliptic integral of the first kind `K(m)`, `mc = 1 - m`.
///
/// Diverges logarithmically as `mc → 0`; returns `+∞` there.
pub fn elliptic_k(mc: f64) -> f64 {
    debug_assert!(mc <= 1.0);
    if mc <= 0.0 {
        return f64::INFINITY;
    }
    carlson_rf(0.0, mc, 1.0)
}

/// Complete elliptic integral of the second kind `E(m)`, `mc = 1 - m`.
pub fn elliptic_e_complete(mc: f64) -> f64 {
    debug_assert!((0.0..=1.0).contains(&mc));
    if mc == 0.0 {
        return 1.0;
    }
    let m = 1.0 - mc;
    carlson_rf(0.0, mc, 1.0) - m / 3.0 * carlson_rd(0.0, mc, 1.0)
}

/// Incomplete elliptic integral of the first kind `F(φ | m)`, `mc = 1 - m`.
pub fn elliptic_f(phi: f64, mc: f64) -> f64 {
    debug_assert!(mc <= 1.0);
    let m = 1.0 - mc;
    let (k, phi_r) = reduce_amplitude(phi);
    if mc <= 0.0 {
        // m = 1: F(φ | 1) = artanh(sin φ), divergent past the quadrant.
        let partial = phi_r.sin().atanh();
        return if k == 0.0 {
            partial
        } else {
            f64::INFINITY * k.signum()
        };
    }
    let s = phi_r.sin();
    let c = phi_r.cos();
    let partial = if s == 0.0 {
        0.0
    } else {
        s * carlson_rf(c * c, 1.0 - m * s * s, 1.0)
    };
    if k == 0.0 {
        partial
    } else {
        2.0 * k * elliptic_k(mc) + partial
    }
}

/// Incomplete elliptic integral of the second kind `E(φ | m)`, `mc = 1 - m`.
pub fn elliptic_e(phi: f64, mc: f64) -> f64 {
    debug_assert!((0.0..=1.0).contains(&mc));
    let m = 1.0 - mc;
    let (k, phi_r) = reduce_amplitude(phi);
    let s = phi_r.sin();
    let c = phi_r.cos();
    let partial = if s == 0.0 {
        0.0
    } else {
        let q = 1.0 - m * s * s;
        s * carlson_rf(c * c, q, 1.0) - m / 3.0 * s * s * s * carlson_rd(c * c, q, 1.0)
    };
    if k == 0.0 {
        partial
    } else {
        2.0 * k * elliptic_e_complete(mc) + partial
    }
}

/// Incomplete elliptic integral of the third kind `Π(n; φ | m)`, `mc = 1 - m`.
///
/// Requires `n sin²φ < 1` (the circular and hyperbolic cases); the Cauchy
/// principal value past the simple pole is not provided.
pub fn elliptic_pi(phi: f64, n: f64, mc: f64) -> f64 {
    debug_assert!((0.0..=1.0).contains(&mc));
    debug_assert!(n < 1.0);
    let m = 1.0 - mc;
    let (k, phi_r) = reduce_amplitude(phi);
    let s = phi_r.sin();
    let c = phi_r.cos();
    let partial = if s == 0.0 {
        0.0
    } else {
        let q = 1.0 - m * s * s;
        let ns2 = n * s * s;
        debug_assert!(ns2 < 1.0);
        s * carlson_rf(c * c, q, 1.0)
            + n / 3.0 * s * s * s * carlson_rj(c * c, q, 1.0, 1.0 - ns2)
    };
    if k == 0.0 {
        partial
    } else {
        let complete = carlson_rf(0.0, mc, 1.0) + n / 3.0 * carlson_rj(0.0, mc, 1.0, 1.0 - n);
        2.0 * k * complete + partial
    }
}

/// Jacobi elliptic functions `(sn u, cn u, dn u)` for parameter `m = 1 - mc`.
///
/// Uses the descending Landen transformation. `mc = 0` is the hyperbolic
/// limit (`sn = tanh`, `cn = dn = sech`); `mc < 0` is handled through the
/// reciprocal-parameter transformation.
pub fn jacobi_sn_cn_dn(u: f64, mc: f64) -> (f64, f64, f64) {
    if mc == 0.0 {
        let cn = 1.0 / u.cosh();
        return (u.tanh(), cn, cn);
    }
    let mut emc = mc;
    let mut uu = u;
    let mut d = 1.0;
    let bo = emc < 0.0;
    if bo {
        d = 1.0 - emc;
        emc = -emc * d;
        d = d.sqrt();
        uu *= d;
    }
    let mut a = 1.0;
    let mut dn = 1.0;
    let mut em = [0.0f64; 13];
    let mut en = [0.0f64; 13];
    let mut l = 0;
    let mut c = 0.0;
    for i in 0..13 {
        l = i;
        em[i] = a;
        emc = emc.sqrt();
        en[i] = emc;
        c = 0.5 * (a + emc);
        if (a - emc).abs() <= CA * a {
            break;
        }
        emc *= a;
        a = c;
    }
    uu *= c;
    let mut sn = uu.sin();
    let mut cn = uu.cos();
    if sn != 0.0 {
        a = cn / sn;
        c *= a;
        for i in (0..=l).rev() {
            let b = em[i];
            a *= c;
            c *= dn;
            dn = (en[i] + a) / (b + a);
            a = c / b;
        }
        a = 1.0 / (c * c + 1.0).sqrt();
        sn = if sn < 0.0 { -a } else { a };
        cn = c * sn;
    }
    if bo {
        std::mem::swap(&mut dn, &mut cn);
        sn /= d;
    }
    (sn, cn, dn)
}
