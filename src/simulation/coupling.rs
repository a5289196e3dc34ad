use nalgebra::zero;

use crate::{
    floating_type_mod::FT, fluid::FluidSolver, simulation_parameters::CouplingParams, sph_kernels::density_kernel,
    string_solver::StringSolver, V2,
};

// accumulated forces below this squared magnitude are not injected
const MIN_FORCE_SQ: FT = 0.001;

/**
 * Translates string kinematics into external forces on nearby fluid
 * particles. Owns no simulation state: per step it reads the string's
 * post-integration node list and writes into the fluid's external-force
 * input, which the fluid consumes and clears at its next integration.
 */
pub struct CouplingField {
    params: CouplingParams,
}

impl CouplingField {
    pub fn new(params: CouplingParams) -> CouplingField {
        CouplingField { params }
    }

    /**
     * O(particles x string nodes); the node count is small and bounded by
     * configuration, so no spatial acceleration structure is used here.
     */
    pub fn apply(&self, string: &StringSolver, fluid: &mut FluidSolver) {
        let string_positions = string.positions();
        let string_velocities = string.velocities();
        assert!(
            string_positions.len() == string_velocities.len(),
            "string exposes {} positions but {} velocities",
            string_positions.len(),
            string_velocities.len()
        );

        for i in 0..fluid.particle_count() {
            let particle_position = fluid.particle_position(i);

            let mut total_force: V2 = zero();
            for j in 1..string_positions.len() - 1 {
                let speed = string_velocities[j].norm();
                // skip segments that are barely moving
                if speed < self.params.velocity_threshold {
                    continue;
                }

                let offset = particle_position - string_positions[j];
                let dist = offset.norm();
                if dist >= self.params.influence_radius || dist <= 0. {
                    continue;
                }

                // force falls off with distance and points from the node to
                // the particle
                let influence = density_kernel(dist, self.params.influence_radius);
                total_force += offset / dist * speed * influence * self.params.force_multiplier;
            }

            if total_force.norm_squared() > MIN_FORCE_SQ {
                fluid.apply_external_force(i, total_force);
            }
        }
    }
}

#[cfg(test)]
fn test_fluid(particle_position: V2) -> FluidSolver {
    use crate::{boundary::BoundaryField, simulation_parameters::FluidParams, vec2f};

    let boundary = BoundaryField::new(vec2f(100., 100.), 1.0, Some(0), 2.75).unwrap();
    FluidSolver::new(
        vec![particle_position],
        vec![zero()],
        boundary,
        Vec::new(),
        vec2f(100., 100.),
        FluidParams::default(),
    )
    .unwrap()
}

#[cfg(test)]
fn test_string() -> StringSolver {
    use crate::{simulation_parameters::StringParams, vec2f};

    let params = StringParams {
        string_length: 4.0,
        num_segments: 3,
        initial_sag: 0.0,
        damping: 0.01,
        gravity: 0.0,
        ..StringParams::default()
    };
    StringSolver::new(vec2f(-2., 0.), vec2f(2., 0.), params).unwrap()
}

#[test]
fn moving_string_node_pushes_nearby_particles_away() {
    use crate::vec2f;

    // particle above the middle node, out of reach of the outer nodes
    let mut fluid = test_fluid(vec2f(0., 0.6));
    let mut string = test_string();

    // accelerate the middle node upward past the velocity threshold
    string.apply_force(2, vec2f(0., 200.), 0.02);
    string.step(0.01);
    assert!(string.velocities()[2].norm() > CouplingParams::default().velocity_threshold);

    let coupling = CouplingField::new(CouplingParams::default());
    coupling.apply(&string, &mut fluid);

    let external_force = fluid.particles.external_force[0];
    assert!(
        external_force.y > 0.,
        "force must point from the node to the particle (got {:?})",
        external_force
    );
}

#[test]
fn resting_string_injects_no_force() {
    use crate::vec2f;

    let mut fluid = test_fluid(vec2f(0., 0.6));
    let string = test_string();

    let coupling = CouplingField::new(CouplingParams::default());
    coupling.apply(&string, &mut fluid);

    assert_eq!(fluid.particles.external_force[0], zero::<V2>());
}

#[test]
fn distant_particles_are_unaffected() {
    use crate::vec2f;

    let mut fluid = test_fluid(vec2f(50., 50.));
    let mut string = test_string();

    string.apply_force(2, vec2f(0., 200.), 0.02);
    string.step(0.01);

    let coupling = CouplingField::new(CouplingParams::default());
    coupling.apply(&string, &mut fluid);

    assert_eq!(fluid.particles.external_force[0], zero::<V2>());
}
