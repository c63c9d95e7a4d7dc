//! # Published embedded method coefficients
//!
//! The Butcher tableaux of the embedded pairs exposed by this crate,
//! reproduced from their literature definitions. The coefficients are the
//! sole parameterization distinguishing integrator families; they determine
//! the order and stability region, so they are written as exact rationals
//! and validated at first use.
//!
//! Sources
//! -----------------
//! * Dormand & Prince (1980), *A family of embedded Runge-Kutta formulae*,
//!   J. Comp. Appl. Math. 6, 19–26 — RK5(4)7M, FSAL.
//! * Fehlberg (1969), NASA TR R-315 — RKF4(5).
//! * Bogacki & Shampine (1989), *A 3(2) pair of Runge-Kutta formulas*,
//!   Appl. Math. Lett. 2, 321–325 — FSAL.
//! * Heun–Euler: the classic 2(1) pair.

use std::sync::LazyLock;

use crate::fixed_arrays::{FixedStrictlyLowerTriangularMatrix, FixedVector};
use crate::integrators::EmbeddedExplicitRungeKutta;

static DORMAND_PRINCE_1980_RK5_4: LazyLock<EmbeddedExplicitRungeKutta<7, 21>> =
    LazyLock::new(|| {
        EmbeddedExplicitRungeKutta::new(
            "Dormand-Prince 1980 RK5(4)7M",
            5,
            4,
            /*first_same_as_last=*/ true,
            FixedVector::new([0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0]),
            FixedStrictlyLowerTriangularMatrix::new([
                1.0 / 5.0,
                3.0 / 40.0,
                9.0 / 40.0,
                44.0 / 45.0,
                -56.0 / 15.0,
                32.0 / 9.0,
                19_372.0 / 6_561.0,
                -25_360.0 / 2_187.0,
                64_448.0 / 6_561.0,
                -212.0 / 729.0,
                9_017.0 / 3_168.0,
                -355.0 / 33.0,
                46_732.0 / 5_247.0,
                49.0 / 176.0,
                -5_103.0 / 18_656.0,
                35.0 / 384.0,
                0.0,
                500.0 / 1_113.0,
                125.0 / 192.0,
                -2_187.0 / 6_784.0,
                11.0 / 84.0,
            ]),
            FixedVector::new([
                35.0 / 384.0,
                0.0,
                500.0 / 1_113.0,
                125.0 / 192.0,
                -2_187.0 / 6_784.0,
                11.0 / 84.0,
                0.0,
            ]),
            FixedVector::new([
                5_179.0 / 57_600.0,
                0.0,
                7_571.0 / 16_695.0,
                393.0 / 640.0,
                -92_097.0 / 339_200.0,
                187.0 / 2_100.0,
                1.0 / 40.0,
            ]),
        )
        .expect("Dormand-Prince 1980 RK5(4)7M is a published tableau")
    });

/// Dormand–Prince RK5(4)7M: 7 stages, orders 5(4), FSAL.
pub fn dormand_prince_1980_rk5_4() -> &'static EmbeddedExplicitRungeKutta<7, 21> {
    &DORMAND_PRINCE_1980_RK5_4
}

static FEHLBERG_1969_RK4_5: LazyLock<EmbeddedExplicitRungeKutta<6, 15>> = LazyLock::new(|| {
    EmbeddedExplicitRungeKutta::new(
        "Fehlberg 1969 RK4(5)",
        5,
        4,
        /*first_same_as_last=*/ false,
        FixedVector::new([0.0, 1.0 / 4.0, 3.0 / 8.0, 12.0 / 13.0, 1.0, 1.0 / 2.0]),
        FixedStrictlyLowerTriangularMatrix::new([
            1.0 / 4.0,
            3.0 / 32.0,
            9.0 / 32.0,
            1_932.0 / 2_197.0,
            -7_200.0 / 2_197.0,
            7_296.0 / 2_197.0,
            439.0 / 216.0,
            -8.0,
            3_680.0 / 513.0,
            -845.0 / 4_104.0,
            -8.0 / 27.0,
            2.0,
            -3_544.0 / 2_565.0,
            1_859.0 / 4_104.0,
            -11.0 / 40.0,
        ]),
        FixedVector::new([
            16.0 / 135.0,
            0.0,
            6_656.0 / 12_825.0,
            28_561.0 / 56_430.0,
            -9.0 / 50.0,
            2.0 / 55.0,
        ]),
        FixedVector::new([
            25.0 / 216.0,
            0.0,
            1_408.0 / 2_565.0,
            2_197.0 / 4_104.0,
            -1.0 / 5.0,
            0.0,
        ]),
    )
    .expect("Fehlberg 1969 RK4(5) is a published tableau")
});

/// Fehlberg RK4(5): 6 stages, orders 5(4).
pub fn fehlberg_1969_rk4_5() -> &'static EmbeddedExplicitRungeKutta<6, 15> {
    &FEHLBERG_1969_RK4_5
}

static BOGACKI_SHAMPINE_1989_RK3_2: LazyLock<EmbeddedExplicitRungeKutta<4, 6>> =
    LazyLock::new(|| {
        EmbeddedExplicitRungeKutta::new(
            "Bogacki-Shampine 1989 RK3(2)",
            3,
            2,
            /*first_same_as_last=*/ true,
            FixedVector::new([0.0, 1.0 / 2.0, 3.0 / 4.0, 1.0]),
            FixedStrictlyLowerTriangularMatrix::new([
                1.0 / 2.0,
                0.0,
                3.0 / 4.0,
                2.0 / 9.0,
                1.0 / 3.0,
                4.0 / 9.0,
            ]),
            FixedVector::new([2.0 / 9.0, 1.0 / 3.0, 4.0 / 9.0, 0.0]),
            FixedVector::new([7.0 / 24.0, 1.0 / 4.0, 1.0 / 3.0, 1.0 / 8.0]),
        )
        .expect("Bogacki-Shampine 1989 RK3(2) is a published tableau")
    });

/// Bogacki–Shampine RK3(2): 4 stages, orders 3(2), FSAL.
pub fn bogacki_shampine_1989_rk3_2() -> &'static EmbeddedExplicitRungeKutta<4, 6> {
    &BOGACKI_SHAMPINE_1989_RK3_2
}

static HEUN_EULER_RK2_1: LazyLock<EmbeddedExplicitRungeKutta<2, 1>> = LazyLock::new(|| {
    EmbeddedExplicitRungeKutta::new(
        "Heun-Euler RK2(1)",
        2,
        1,
        /*first_same_as_last=*/ false,
        FixedVector::new([0.0, 1.0]),
        FixedStrictlyLowerTriangularMatrix::new([1.0]),
        FixedVector::new([1.0 / 2.0, 1.0 / 2.0]),
        FixedVector::new([1.0, 0.0]),
    )
    .expect("Heun-Euler RK2(1) is a published tableau")
});

/// Heun–Euler RK2(1): 2 stages, orders 2(1).
pub fn heun_euler_rk2_1() -> &'static EmbeddedExplicitRungeKutta<2, 1> {
    &HEUN_EULER_RK2_1
}
