use crate::floating_type_mod::{FT, PI};

/**
 * The kernel for the density estimation. Compact support: zero at and
 * beyond `radius`.
 */
pub fn density_kernel(dist: FT, radius: FT) -> FT {
    if dist >= radius {
        return 0.;
    }

    let volume = PI * radius.powi(4) / 6.;
    let value = radius - dist;
    value * value / volume
}

/**
 * Derivative form of the density kernel, used as the pressure gradient
 * weight.
 */
pub fn pressure_kernel_deriv(dist: FT, radius: FT) -> FT {
    if dist >= radius {
        return 0.;
    }

    let scale = 12. / (radius.powi(4) * PI);
    (radius - dist) * scale
}

/** The smoothing kernel for the viscosity force. */
pub fn viscosity_kernel(dist: FT, radius: FT) -> FT {
    if dist >= radius {
        return 0.;
    }

    let volume = PI * radius.powi(4) / 6.;
    let value = radius * radius - dist * dist;
    value * value / volume
}

#[test]
fn kernels_have_compact_support() {
    for radius in [0.15, 0.5, 1.0, 2.0] {
        for factor in [1.0, 1.000001, 1.5, 10.0] {
            let dist: FT = radius * factor;
            assert_eq!(density_kernel(dist, radius), 0.);
            assert_eq!(pressure_kernel_deriv(dist, radius), 0.);
            assert_eq!(viscosity_kernel(dist, radius), 0.);
        }
    }
}

#[test]
fn kernels_reach_analytic_maximum_at_zero_distance() {
    use crate::assert_ft_approx_eq;

    for radius in [0.15 as FT, 0.5, 2.0] {
        let r4 = radius.powi(4);

        let density_max = radius * radius * 6. / (PI * r4);
        assert_ft_approx_eq(density_kernel(0., radius), density_max, density_max * 1e-5, || {
            format!("density kernel maximum for radius {}", radius)
        });

        let pressure_max = 12. * radius / (PI * r4);
        assert_ft_approx_eq(pressure_kernel_deriv(0., radius), pressure_max, pressure_max * 1e-5, || {
            format!("pressure kernel maximum for radius {}", radius)
        });

        let viscosity_max = r4 * 6. / (PI * r4);
        assert_ft_approx_eq(viscosity_kernel(0., radius), viscosity_max, viscosity_max * 1e-5, || {
            format!("viscosity kernel maximum for radius {}", radius)
        });
    }
}

#[test]
fn kernels_fall_off_monotonically() {
    let radius = 0.5;
    let samples = 50;
    for i in 0..samples - 1 {
        let d0 = radius * i as FT / samples as FT;
        let d1 = radius * (i + 1) as FT / samples as FT;
        assert!(density_kernel(d1, radius) < density_kernel(d0, radius));
        assert!(pressure_kernel_deriv(d1, radius) < pressure_kernel_deriv(d0, radius));
        assert!(viscosity_kernel(d1, radius) < viscosity_kernel(d0, radius));
    }
}
