use nalgebra::zero;
use num_traits::Float;
use rand::Rng;
use std::fmt::Display;

use crate::{
    boundary::BoundaryField,
    concurrency::{par_iter_mut1, par_iter_mut2, par_iter_mut3},
    floating_type_mod::FT,
    simulation_parameters::FluidParams,
    spatial_hash::SpatialHashGrid,
    sph_kernels::{density_kernel, pressure_kernel_deriv, viscosity_kernel},
    vec2f, V2,
};

/** All fluid particles share the same mass. */
pub const PARTICLE_MASS: FT = 1.;

macro_rules! decl_particle_vec {
    (pub struct $struct_name:ident { $(pub $field_name:ident: Vec<$field_type:ty> | $default_value:expr),*$(,)? }) => {
        pub struct $struct_name {
            $(
                pub $field_name: Vec<$field_type>,
            )*
        }

        impl $struct_name {
            pub fn default(len: usize) -> Self {
                Self {
                    $(
                        $field_name: (0..len).map(|_| $default_value).collect::<Vec<$field_type>>(),
                    )*
                }
            }
        }
    }
}

decl_particle_vec! {
    pub struct ParticleVec {
        pub position: Vec<V2> | zero(),
        pub velocity: Vec<V2> | zero(),

        // velocity-extrapolated sample point, only valid within a step
        pub predicted_position: Vec<V2> | zero(),

        // recomputed every step before it is read
        pub density: Vec<FT> | 0.,

        // transient per-step force accumulators
        pub pressure_force: Vec<V2> | zero(),
        pub viscosity_force: Vec<V2> | zero(),
        pub external_force: Vec<V2> | zero(),
    }
}

/// Axis-aligned static obstacle.
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub center: V2,
    pub half_size: V2,
}

pub struct FluidSolver {
    pub particles: ParticleVec,
    grid: SpatialHashGrid,
    boundary: BoundaryField,
    obstacles: Vec<Aabb>,
    bounds_size: V2,
    params: FluidParams,
    step_number: usize,
}

impl FluidSolver {
    pub fn new(
        positions: Vec<V2>,
        velocities: Vec<V2>,
        boundary: BoundaryField,
        obstacles: Vec<Aabb>,
        bounds_size: V2,
        params: FluidParams,
    ) -> Result<FluidSolver, String> {
        let num_particles = positions.len();
        if num_particles == 0 {
            return Err("fluid solver needs at least one particle".to_string());
        }
        if velocities.len() != num_particles {
            return Err(format!(
                "position/velocity length mismatch: {} positions, {} velocities",
                num_particles,
                velocities.len()
            ));
        }
        if !(params.smoothing_radius > 0.) {
            return Err(format!("smoothing radius must be positive (got {})", params.smoothing_radius));
        }
        if !(params.target_density > 0.) {
            return Err(format!("target density must be positive (got {})", params.target_density));
        }

        let grid = SpatialHashGrid::new(num_particles)?;

        let mut particles = ParticleVec::default(num_particles);
        particles.position = positions;
        particles.velocity = velocities;

        Ok(FluidSolver {
            particles,
            grid,
            boundary,
            obstacles,
            bounds_size,
            params,
            step_number: 0,
        })
    }

    /**
     * Advances the fluid by `dt` in four passes with a full barrier between
     * them: density, viscosity, pressure, then integrate + collide. Each
     * pass writes a particle's own fields only, so the work inside a pass
     * is parallelized per particle.
     */
    pub fn step(&mut self, dt: FT) {
        assert!(dt > 0., "step size must be positive (got {})", dt);

        let params = self.params;
        let particles = &mut self.particles;

        self.grid.rebuild(&particles.position, params.smoothing_radius);
        let grid = &self.grid;
        let boundary = &self.boundary;

        // density pass: sample at the velocity-extrapolated position,
        // measuring distances against the neighbors' actual positions
        {
            let position = &particles.position;
            let velocity = &particles.velocity;
            par_iter_mut2(
                &mut particles.predicted_position,
                &mut particles.density,
                |i, p_predicted_position, p_density| {
                    let predicted = position[i] + velocity[i] * dt;
                    *p_predicted_position = predicted;

                    let mut density: FT = 0.;
                    grid.for_each_in_surrounding_cells(predicted, params.smoothing_radius, |_, dist| {
                        density += PARTICLE_MASS * density_kernel(dist, params.smoothing_radius);
                    });

                    // the solid particles are few and fixed, always scanned linearly
                    for &solid_position in boundary.positions() {
                        let dist = (solid_position - predicted).norm();
                        density += PARTICLE_MASS * density_kernel(dist, params.solid_influence_radius);
                    }

                    assert!(density > 0., "particle {} ended up with zero density", i);
                    *p_density = density;
                },
            );
        }

        // viscosity pass, staged into `viscosity_force` so no thread reads a
        // velocity another thread is writing
        {
            let position = &particles.position;
            let velocity = &particles.velocity;
            par_iter_mut1(&mut particles.viscosity_force, |i, p_viscosity_force| {
                let sample_point = position[i];

                let mut force: V2 = zero();
                grid.for_each_in_surrounding_cells(sample_point, params.smoothing_radius, |j, dist| {
                    force += (velocity[j] - velocity[i]) * viscosity_kernel(dist, params.smoothing_radius);
                });

                *p_viscosity_force = force * params.viscosity_strength;
            });
        }
        {
            let density = &particles.density;
            let viscosity_force = &particles.viscosity_force;
            par_iter_mut1(&mut particles.velocity, |i, p_velocity| {
                *p_velocity += viscosity_force[i] / density[i] * dt;
            });
        }

        // pressure pass
        {
            let position = &particles.position;
            let density = &particles.density;
            par_iter_mut1(&mut particles.pressure_force, |i, p_pressure_force| {
                let sample_point = position[i];
                let density_i = density[i];

                let mut force: V2 = zero();
                grid.for_each_in_surrounding_cells(sample_point, params.smoothing_radius, |j, dist| {
                    if i == j {
                        return;
                    }

                    let offset = position[j] - sample_point;
                    // make sure we don't divide by zero
                    let dir = if dist <= 0. { random_direction() } else { offset / dist };

                    let slope = pressure_kernel_deriv(dist, params.smoothing_radius);
                    let shared_pressure = calculate_shared_pressure(density[j], density_i, params);

                    // pushes both particles of the pair with the same force
                    force += -shared_pressure * dir * slope * PARTICLE_MASS / density[j];
                });

                // boundary contribution from every solid particle
                for &solid_position in boundary.positions() {
                    let offset = solid_position - sample_point;
                    let dist = offset.norm();
                    let dir = if dist <= 0. { random_direction() } else { offset / dist };

                    let slope = pressure_kernel_deriv(dist, params.solid_influence_radius);
                    let shared_pressure = calculate_shared_pressure(boundary.density(), density_i, params);

                    force += -shared_pressure * dir * slope * PARTICLE_MASS / boundary.density();
                }

                *p_pressure_force = force;
            });
        }

        // integrate + collide; the external-force input participates here
        // and is cleared for the next step
        {
            let density = &particles.density;
            let pressure_force = &particles.pressure_force;
            let obstacles = &self.obstacles;
            let bounds_size = self.bounds_size;
            par_iter_mut3(
                &mut particles.velocity,
                &mut particles.position,
                &mut particles.external_force,
                |i, p_velocity, p_position, p_external_force| {
                    let acceleration = (pressure_force[i] + *p_external_force) / density[i];
                    *p_external_force = zero();

                    *p_velocity += acceleration * dt;
                    *p_position += *p_velocity * dt;

                    resolve_bound_collisions(p_position, p_velocity, bounds_size, params);
                    for obstacle in obstacles {
                        resolve_obstacle_collision(p_position, p_velocity, obstacle, params);
                    }
                },
            );
        }

        self.step_number += 1;
    }

    pub fn particle_count(&self) -> usize {
        self.particles.position.len()
    }

    /// Bounds-checked; out-of-range queries return the zero vector.
    pub fn particle_position(&self, index: usize) -> V2 {
        self.particles.position.get(index).copied().unwrap_or_else(zero)
    }

    /**
     * Accumulates into the per-particle external-force buffer. The force is
     * converted to an acceleration at the next integration, using the
     * particle's density at that time. Out-of-range indices are a no-op.
     */
    pub fn apply_external_force(&mut self, index: usize, force: V2) {
        if let Some(external_force) = self.particles.external_force.get_mut(index) {
            *external_force += force;
        }
    }

    pub fn set_obstacles(&mut self, obstacles: Vec<Aabb>) {
        self.obstacles = obstacles;
    }

    pub fn params(&self) -> FluidParams {
        self.params
    }

    pub fn bounds_size(&self) -> V2 {
        self.bounds_size
    }

    pub fn step_number(&self) -> usize {
        self.step_number
    }
}

/// Newton's third law: both sides of a pair see the same pressure value.
pub fn calculate_shared_pressure(density_a: FT, density_b: FT, params: FluidParams) -> FT {
    let pressure_a = convert_density_to_pressure(density_a, params);
    let pressure_b = convert_density_to_pressure(density_b, params);
    (pressure_a + pressure_b) / 2.
}

/**
 * Idealized equation of state, linear in the density error. Negative
 * pressure is permitted and means attraction below the rest density.
 */
pub fn convert_density_to_pressure(density: FT, params: FluidParams) -> FT {
    (density - params.target_density) * params.pressure_multiplier
}

fn random_direction() -> V2 {
    let mut rng = rand::thread_rng();
    vec2f(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
}

fn resolve_bound_collisions(position: &mut V2, velocity: &mut V2, bounds_size: V2, params: FluidParams) {
    let half_bounds = bounds_size * 0.5 - vec2f(params.particle_radius, params.particle_radius);

    // place the particle at the bound and reverse the velocity component
    if position.x.abs() > half_bounds.x {
        position.x = half_bounds.x * position.x.signum();
        velocity.x *= -params.collision_damping;
    }
    if position.y.abs() > half_bounds.y {
        position.y = half_bounds.y * position.y.signum();
        velocity.y *= -params.collision_damping;
    }
}

fn resolve_obstacle_collision(position: &mut V2, velocity: &mut V2, obstacle: &Aabb, params: FluidParams) {
    let radius = params.particle_radius;

    // distance from the particle to each outer edge; all non-negative
    // exactly when the particle overlaps the box
    let diff_to_left = position.x + radius - (obstacle.center.x - obstacle.half_size.x);
    let diff_to_right = -position.x + radius + (obstacle.center.x + obstacle.half_size.x);
    let diff_to_bottom = position.y + radius - (obstacle.center.y - obstacle.half_size.y);
    let diff_to_top = -position.y + radius + (obstacle.center.y + obstacle.half_size.y);

    let inside = diff_to_left >= 0. && diff_to_right >= 0. && diff_to_bottom >= 0. && diff_to_top >= 0.;
    if !inside {
        return;
    }

    // push out along the axis with the smallest penetration
    if diff_to_left < diff_to_right && diff_to_left < diff_to_top && diff_to_left < diff_to_bottom {
        position.x = (obstacle.center.x - obstacle.half_size.x) - radius;
    } else if diff_to_right < diff_to_left && diff_to_right < diff_to_top && diff_to_right < diff_to_bottom {
        position.x = (obstacle.center.x + obstacle.half_size.x) + radius;
    } else if diff_to_bottom < diff_to_top && diff_to_bottom < diff_to_right && diff_to_bottom < diff_to_left {
        position.y = (obstacle.center.y - obstacle.half_size.y) - radius;
    } else {
        position.y = (obstacle.center.y + obstacle.half_size.y) + radius;
    }

    velocity.x *= -params.collision_damping;
    velocity.y *= -params.collision_damping;
}

pub fn is_ft_approx_eq<FT: Float>(a: FT, b: FT, tolerance: FT) -> bool {
    assert!(!a.is_nan());
    assert!(!b.is_nan());
    b <= a + tolerance && b >= a - tolerance
}

pub fn assert_ft_approx_eq<FT: Float + Display>(a: FT, b: FT, tolerance: FT, s: impl FnOnce() -> String) {
    if !is_ft_approx_eq(a, b, tolerance) {
        panic!("assertion '{} == {}' with tolerance {} failed: {}", a, b, tolerance, s());
    }
}

#[cfg(test)]
fn empty_boundary() -> BoundaryField {
    BoundaryField::new(vec2f(100., 100.), 1.0, Some(0), 2.75).unwrap()
}

#[cfg(test)]
fn corner_solver(spacing: FT, target_density: FT) -> FluidSolver {
    let positions = vec![
        vec2f(-spacing / 2., -spacing / 2.),
        vec2f(spacing / 2., -spacing / 2.),
        vec2f(-spacing / 2., spacing / 2.),
        vec2f(spacing / 2., spacing / 2.),
    ];
    let velocities = vec![zero(); 4];
    let params = FluidParams {
        smoothing_radius: 2.0,
        target_density,
        pressure_multiplier: 0.5,
        viscosity_strength: 0.,
        ..FluidParams::default()
    };
    FluidSolver::new(positions, velocities, empty_boundary(), Vec::new(), vec2f(100., 100.), params).unwrap()
}

#[test]
fn configuration_errors_are_fatal_at_construction() {
    let params = FluidParams::default();

    assert!(FluidSolver::new(Vec::new(), Vec::new(), empty_boundary(), Vec::new(), vec2f(8., 6.), params).is_err());

    assert!(FluidSolver::new(
        vec![vec2f(0., 0.)],
        Vec::new(),
        empty_boundary(),
        Vec::new(),
        vec2f(8., 6.),
        params
    )
    .is_err());

    let bad_params = FluidParams {
        smoothing_radius: 0.,
        ..FluidParams::default()
    };
    assert!(FluidSolver::new(
        vec![vec2f(0., 0.)],
        vec![zero()],
        empty_boundary(),
        Vec::new(),
        vec2f(8., 6.),
        bad_params
    )
    .is_err());
}

#[test]
fn shared_pressure_is_symmetric_in_its_arguments() {
    let params = FluidParams::default();
    for (d1, d2) in [(1.0, 3.0), (2.75, 0.5), (0.1, 0.1)] {
        assert_ft_approx_eq(
            calculate_shared_pressure(d1, d2, params),
            calculate_shared_pressure(d2, d1, params),
            1e-6,
            || format!("shared pressure for densities {} and {}", d1, d2),
        );
        assert_ft_approx_eq(
            calculate_shared_pressure(d1, d2, params),
            (convert_density_to_pressure(d1, params) + convert_density_to_pressure(d2, params)) / 2.,
            1e-6,
            || "shared pressure is the arithmetic mean".to_string(),
        );
    }
}

#[test]
fn pair_forces_are_equal_and_opposite() {
    let positions = vec![vec2f(-0.1, 0.), vec2f(0.1, 0.)];
    let velocities = vec![zero(); 2];
    let params = FluidParams {
        target_density: 0.1,
        viscosity_strength: 0.,
        ..FluidParams::default()
    };
    let mut solver =
        FluidSolver::new(positions, velocities, empty_boundary(), Vec::new(), vec2f(100., 100.), params).unwrap();

    solver.step(0.001);

    let f0 = solver.particles.pressure_force[0];
    let f1 = solver.particles.pressure_force[1];
    assert_ft_approx_eq(f0.x, -f1.x, 1e-4, || "pair force x antisymmetry".to_string());
    assert_ft_approx_eq(f0.y, -f1.y, 1e-4, || "pair force y antisymmetry".to_string());
    assert!(f0.norm() > 0., "particles above rest density must repel");
}

#[test]
fn equation_of_state_is_monotonic_in_density() {
    let params = FluidParams::default();
    let mut last = convert_density_to_pressure(0., params);
    for i in 1..100 {
        let pressure = convert_density_to_pressure(i as FT * 0.1, params);
        assert!(pressure > last);
        last = pressure;
    }
}

#[test]
fn tighter_cluster_produces_stronger_repulsion() {
    let mut tight = corner_solver(0.4, 0.01);
    let mut loose = corner_solver(1.0, 0.01);
    tight.step(0.001);
    loose.step(0.001);

    let tight_force = tight.particles.pressure_force[0].norm();
    let loose_force = loose.particles.pressure_force[0].norm();
    assert!(
        tight_force > loose_force,
        "tight cluster force {} should exceed loose cluster force {}",
        tight_force,
        loose_force
    );
}

#[test]
fn corner_scenario_forces_are_symmetric_and_radial() {
    // all four particles above rest density: repulsion, pointing outward
    let mut solver = corner_solver(1.0, 0.01);
    let initial_positions = solver.particles.position.clone();
    solver.step(0.001);

    let mut sum: V2 = zero();
    let magnitude = solver.particles.pressure_force[0].norm();
    for i in 0..4 {
        let force = solver.particles.pressure_force[i];
        sum += force;
        assert_ft_approx_eq(force.norm(), magnitude, 1e-4, || format!("force magnitude of particle {}", i));
        assert!(
            force.dot(&initial_positions[i]) > 0.,
            "repulsive force on particle {} must point away from the center",
            i
        );
    }
    assert!(sum.norm() < 1e-4, "forces must cancel by symmetry (got |sum| = {})", sum.norm());

    // all four below rest density: negative pressure, attraction
    let mut solver = corner_solver(1.0, 2.75);
    let initial_positions = solver.particles.position.clone();
    solver.step(0.001);

    let mut sum: V2 = zero();
    for i in 0..4 {
        let force = solver.particles.pressure_force[i];
        sum += force;
        assert!(
            force.dot(&initial_positions[i]) < 0.,
            "attractive force on particle {} must point toward the center",
            i
        );
    }
    assert!(sum.norm() < 1e-4);
}

#[test]
fn external_force_is_consumed_once_and_cleared() {
    let positions = vec![vec2f(0., 0.)];
    let velocities = vec![zero()];
    let params = FluidParams {
        viscosity_strength: 0.,
        ..FluidParams::default()
    };
    let mut solver =
        FluidSolver::new(positions, velocities, empty_boundary(), Vec::new(), vec2f(100., 100.), params).unwrap();

    let dt = 0.01;
    solver.apply_external_force(0, vec2f(3., 0.));
    solver.step(dt);

    // a lone particle feels no pressure or viscosity force
    let density = solver.particles.density[0];
    assert_ft_approx_eq(solver.particles.velocity[0].x, 3. / density * dt, 1e-5, || {
        "external force integrates as acceleration".to_string()
    });

    // the buffer is cleared, so a second step changes nothing
    let velocity_before = solver.particles.velocity[0];
    solver.step(dt);
    assert_ft_approx_eq(solver.particles.velocity[0].x, velocity_before.x, 1e-5, || {
        "external force buffer must be cleared after integration".to_string()
    });

    // out-of-range index is a no-op
    solver.apply_external_force(17, vec2f(1000., 0.));
    assert_eq!(solver.particles.external_force.len(), 1);
}

#[test]
fn out_of_range_position_query_returns_zero() {
    let solver = corner_solver(1.0, 2.75);
    assert_eq!(solver.particle_position(100), zero::<V2>());
    assert!(solver.particle_position(0).norm() > 0.);
}

#[test]
fn bound_collision_clamps_and_reflects() {
    let params = FluidParams::default();
    let bounds = vec2f(8., 6.);

    let mut position = vec2f(4.5, 0.);
    let mut velocity = vec2f(2., 1.);
    resolve_bound_collisions(&mut position, &mut velocity, bounds, params);

    assert_ft_approx_eq(position.x, 4. - params.particle_radius, 1e-6, || "clamped to bound".to_string());
    assert_ft_approx_eq(velocity.x, -2. * params.collision_damping, 1e-6, || {
        "velocity reflected and damped".to_string()
    });
    assert_eq!(velocity.y, 1.);
}

#[test]
fn obstacle_collision_pushes_out_along_minimum_penetration_axis() {
    let params = FluidParams::default();
    let obstacle = Aabb {
        center: vec2f(0., 0.),
        half_size: vec2f(1., 0.5),
    };

    // just inside the left face: pushed back out to the left
    let mut position = vec2f(-0.95, 0.);
    let mut velocity = vec2f(1., 0.5);
    resolve_obstacle_collision(&mut position, &mut velocity, &obstacle, params);
    assert_ft_approx_eq(position.x, -1. - params.particle_radius, 1e-6, || {
        "pushed out to the left face".to_string()
    });
    assert_ft_approx_eq(velocity.x, -1. * params.collision_damping, 1e-6, || "x damped".to_string());
    assert_ft_approx_eq(velocity.y, -0.5 * params.collision_damping, 1e-6, || "y damped".to_string());

    // far away: untouched
    let mut position = vec2f(3., 3.);
    let mut velocity = vec2f(1., 1.);
    resolve_obstacle_collision(&mut position, &mut velocity, &obstacle, params);
    assert_eq!(position, vec2f(3., 3.));
    assert_eq!(velocity, vec2f(1., 1.));
}

#[test]
fn replaced_obstacles_take_effect_on_the_next_step() {
    let positions = vec![vec2f(0., 0.)];
    let velocities = vec![zero()];
    let mut solver = FluidSolver::new(
        positions,
        velocities,
        empty_boundary(),
        Vec::new(),
        vec2f(100., 100.),
        FluidParams::default(),
    )
    .unwrap();

    // the particle starts inside the newly registered box and is expelled
    solver.set_obstacles(vec![Aabb {
        center: vec2f(0.2, 0.),
        half_size: vec2f(1., 1.),
    }]);
    solver.step(0.001);

    let position = solver.particle_position(0);
    assert!(
        position.x <= -0.8 - solver.params().particle_radius + 1e-4,
        "particle must be pushed out of the obstacle (got {:?})",
        position
    );
    assert!(position.x.abs() <= solver.bounds_size().x / 2.);
}
