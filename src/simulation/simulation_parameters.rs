use crate::floating_type_mod::FT;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FluidParams {
    pub smoothing_radius: FT,
    pub target_density: FT,
    pub pressure_multiplier: FT,
    pub viscosity_strength: FT,

    // influence radius of the solid wall particles; kept independent of
    // `smoothing_radius` (softer wall repulsion)
    pub solid_influence_radius: FT,

    pub particle_radius: FT,
    pub collision_damping: FT,
}

impl Default for FluidParams {
    fn default() -> FluidParams {
        FluidParams {
            smoothing_radius: 0.5,
            target_density: 2.75,
            pressure_multiplier: 0.5,
            viscosity_strength: 0.2,
            solid_influence_radius: 0.15,
            particle_radius: 0.1,
            collision_damping: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StringParams {
    pub string_length: FT,
    pub tension: FT,        // T
    pub linear_density: FT, // mu, mass per unit length
    pub youngs_modulus: FT, // E, for the bending stiffness term
    pub string_radius: FT,  // for the moment of inertia of the cross-section
    pub damping: FT,        // loss mechanisms
    pub gravity: FT,        // 0 for a horizontal string, >0 for sagging

    pub num_segments: usize, // resolution of the string
    pub iterations: usize,   // constraint solver iterations

    // amplitude of the sine curve the interior nodes start on
    pub initial_sag: FT,

    pub interaction_radius: FT,
    // blend weight pulling the dragged node toward the pointer each step
    pub interaction_strength: FT,
}

impl Default for StringParams {
    fn default() -> StringParams {
        StringParams {
            string_length: 5.0,
            tension: 100.0,
            linear_density: 0.01,
            youngs_modulus: 2e9,
            string_radius: 0.005,
            damping: 0.01,
            gravity: 0.0,
            num_segments: 32,
            iterations: 10,
            initial_sag: 0.1,
            interaction_radius: 0.5,
            interaction_strength: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CouplingParams {
    pub influence_radius: FT,
    pub force_multiplier: FT,

    // minimum node speed that creates a force
    pub velocity_threshold: FT,
}

impl Default for CouplingParams {
    fn default() -> CouplingParams {
        CouplingParams {
            influence_radius: 1.0,
            force_multiplier: 2.0,
            velocity_threshold: 0.1,
        }
    }
}
