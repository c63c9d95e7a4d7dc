//! End-to-end tests: adaptive integration of Kepler two-body motion feeding
//! a forkable, downsampling trajectory store.

use std::cell::RefCell;
use std::f64::consts::PI;
use std::rc::Rc;

use hifitime::{Duration, Epoch};
use nalgebra::Vector3;

use apsis::constants::DPI;
use apsis::degrees_of_freedom::DegreesOfFreedom;
use apsis::fixed_arrays::FixedVector;
use apsis::integrators::methods::dormand_prince_1980_rk5_4;
use apsis::integrators::{AdaptiveStepParameters, InitialValueProblem};
use apsis::trajectory::{DownsamplingParameters, TrajectoryTree};

fn epoch(seconds: f64) -> Epoch {
    Epoch::from_tai_seconds(seconds)
}

/// Planar two-body motion with μ = 1, state (x, y, vx, vy).
fn kepler_rhs(_t: Epoch, y: &FixedVector<4>) -> FixedVector<4> {
    let r2 = y[0] * y[0] + y[1] * y[1];
    let r3 = r2 * r2.sqrt();
    FixedVector::new([y[2], y[3], -y[0] / r3, -y[1] / r3])
}

/// Circular orbit of radius 1: x = cos t, y = sin t.
fn circular_orbit_problem() -> InitialValueProblem<4, fn(Epoch, &FixedVector<4>) -> FixedVector<4>>
{
    InitialValueProblem {
        initial_time: epoch(0.0),
        initial_state: FixedVector::new([1.0, 0.0, 0.0, 1.0]),
        right_hand_side: kepler_rhs,
    }
}

fn parameters(first_step: f64) -> AdaptiveStepParameters {
    AdaptiveStepParameters::new(
        Duration::from_seconds(first_step),
        Duration::from_seconds(1.0e-12),
        0.9,
        4.0,
        0.1,
    )
    .unwrap()
}

fn ratio_for(tolerance: f64) -> impl FnMut(&FixedVector<4>, &FixedVector<4>) -> f64 {
    move |error: &FixedVector<4>, _state: &FixedVector<4>| tolerance / error.norm()
}

#[test]
fn test_one_revolution_step_count_scales_with_tolerance() {
    let method = dormand_prince_1980_rk5_4();
    let mut step_counts = Vec::new();
    let mut errors = Vec::new();

    for tolerance in [1.0e-6, 1.0e-9] {
        let accepted = Rc::new(RefCell::new(0usize));
        let counter = accepted.clone();
        let mut instance = method.new_instance(
            circular_orbit_problem(),
            move |_t, _y| *counter.borrow_mut() += 1,
            ratio_for(tolerance),
            parameters(0.05),
        );
        instance.solve(epoch(DPI)).unwrap();

        let y = instance.state();
        let distance = ((y[0] - 1.0).powi(2) + y[1].powi(2)).sqrt();
        errors.push(distance);
        step_counts.push(*accepted.borrow());
    }

    // The body returns to its starting position, more closely as the
    // tolerance shrinks.
    assert!(errors[0] < 1.0e-3, "distance {} at tol 1e-6", errors[0]);
    assert!(errors[1] < 1.0e-6, "distance {} at tol 1e-9", errors[1]);
    assert!(errors[1] < errors[0]);

    // Accepted steps grow as tolerance^(-1/5), the signature of the
    // 4th-order error estimate: three decades ≈ a factor 10^(3/5) ≈ 4.
    let ratio = step_counts[1] as f64 / step_counts[0] as f64;
    assert!(
        ratio > 2.0 && ratio < 8.0,
        "step counts {step_counts:?}, ratio {ratio}"
    );
}

#[test]
fn test_integration_feeds_downsampling_trajectory() {
    let method = dormand_prince_1980_rk5_4();
    let tree = Rc::new(RefCell::new(TrajectoryTree::new()));
    tree.borrow_mut()
        .set_downsampling(DownsamplingParameters::new(4, 1.0e-6).unwrap())
        .unwrap();
    let root = tree.borrow().root();
    tree.borrow_mut()
        .append(
            root,
            epoch(0.0),
            DegreesOfFreedom::new(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.0)),
        )
        .unwrap();

    let appended = Rc::new(RefCell::new(0usize));
    let sink = tree.clone();
    let counter = appended.clone();
    let mut instance = method.new_instance(
        circular_orbit_problem(),
        move |t: Epoch, y: &FixedVector<4>| {
            *counter.borrow_mut() += 1;
            sink.borrow_mut()
                .append(
                    root,
                    t,
                    DegreesOfFreedom::new(
                        Vector3::new(y[0], y[1], 0.0),
                        Vector3::new(y[2], y[3], 0.0),
                    ),
                )
                .unwrap();
        },
        ratio_for(1.0e-13),
        parameters(0.01),
    );
    instance.solve(epoch(2.0 * DPI)).unwrap();

    let tree = tree.borrow();
    // Downsampling kept the store well below one sample per accepted step.
    let retained = tree.timeline_len(root);
    let appended = *appended.borrow() + 1;
    assert!(
        retained < appended / 2,
        "retained {retained} of {appended} samples"
    );

    // The interpolated orbit stays close to the analytic circle at times
    // that were never sampled, and well within the downsampling tolerance
    // of the integrated path at times that were.
    for i in 0..100 {
        let t = 2.0 * DPI * (i as f64 + 0.5) / 100.0;
        let p = tree.evaluate_position(root, epoch(t)).unwrap();
        let expected = Vector3::new(t.cos(), t.sin(), 0.0);
        assert!(
            (p - expected).norm() < 1.0e-4,
            "interpolated position off by {} at t = {t}",
            (p - expected).norm()
        );
    }
}

#[test]
fn test_what_if_fork_diverges_without_disturbing_parent() {
    let method = dormand_prince_1980_rk5_4();
    let tree = Rc::new(RefCell::new(TrajectoryTree::new()));
    let root = tree.borrow().root();
    tree.borrow_mut()
        .append(
            root,
            epoch(0.0),
            DegreesOfFreedom::new(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.0)),
        )
        .unwrap();

    // Integrate half a revolution into the root.
    let sink = tree.clone();
    let mut instance = method.new_instance(
        circular_orbit_problem(),
        move |t: Epoch, y: &FixedVector<4>| {
            sink.borrow_mut()
                .append(
                    root,
                    t,
                    DegreesOfFreedom::new(
                        Vector3::new(y[0], y[1], 0.0),
                        Vector3::new(y[2], y[3], 0.0),
                    ),
                )
                .unwrap();
        },
        ratio_for(1.0e-9),
        parameters(0.01),
    );
    instance.solve(epoch(PI)).unwrap();

    // Fork a what-if continuation with a prograde kick.
    let fork_time = tree.borrow().t_max(root).unwrap();
    let fork_state = tree.borrow().find_sample(root, fork_time).unwrap();
    let child = tree.borrow_mut().new_fork_at_last(root);

    let kicked = FixedVector::new([
        fork_state.position.x,
        fork_state.position.y,
        fork_state.velocity.x * 1.1,
        fork_state.velocity.y * 1.1,
    ]);
    let sink = tree.clone();
    let mut what_if = method.new_instance(
        InitialValueProblem {
            initial_time: fork_time,
            initial_state: kicked,
            right_hand_side: kepler_rhs,
        },
        move |t: Epoch, y: &FixedVector<4>| {
            sink.borrow_mut()
                .append(
                    child,
                    t,
                    DegreesOfFreedom::new(
                        Vector3::new(y[0], y[1], 0.0),
                        Vector3::new(y[2], y[3], 0.0),
                    ),
                )
                .unwrap();
        },
        ratio_for(1.0e-9),
        parameters(0.01),
    );
    what_if.solve(epoch(DPI)).unwrap();

    // Meanwhile the nominal trajectory finishes its revolution.
    let sink = tree.clone();
    let mut nominal = method
        .resume_instance::<4, _, _, _>(
            &instance.write_snapshot(),
            kepler_rhs,
            move |t: Epoch, y: &FixedVector<4>| {
                sink.borrow_mut()
                    .append(
                        root,
                        t,
                        DegreesOfFreedom::new(
                            Vector3::new(y[0], y[1], 0.0),
                            Vector3::new(y[2], y[3], 0.0),
                        ),
                    )
                    .unwrap();
            },
            ratio_for(1.0e-9),
            parameters(0.01),
        )
        .unwrap();
    nominal.solve(epoch(DPI)).unwrap();

    let tree = tree.borrow();
    // The branches share their history up to the fork point and nothing
    // else: the kicked orbit is no longer circular.
    let shared: Vec<_> = tree
        .iter(root)
        .take_while(|(t, _)| *t <= fork_time)
        .collect();
    let child_prefix: Vec<_> = tree
        .iter(child)
        .take_while(|(t, _)| *t <= fork_time)
        .collect();
    assert_eq!(shared, child_prefix);

    let nominal_end = tree.find_sample(root, tree.t_max(root).unwrap()).unwrap();
    let kicked_end = tree.find_sample(child, tree.t_max(child).unwrap()).unwrap();
    assert!((nominal_end.position - Vector3::new(1.0, 0.0, 0.0)).norm() < 1.0e-5);
    assert!((kicked_end.position - nominal_end.position).norm() > 0.1);
}
