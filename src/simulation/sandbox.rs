use nalgebra::zero;
use serde::{Deserialize, Serialize};

use crate::{
    boundary::BoundaryField,
    coupling::CouplingField,
    floating_type_mod::FT,
    fluid::{Aabb, FluidSolver},
    simulation_parameters::{CouplingParams, FluidParams, StringParams},
    string_solver::StringSolver,
    vec2f, V2,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub fluid: FluidParams,
    pub string: StringParams,
    pub coupling: CouplingParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneBounds {
    pub width: FT,
    pub height: FT,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneFluidBlock {
    pub num_particles: usize,
    pub spacing: FT,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSolidRing {
    pub spacing_radius: FT,
    pub num_solid: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneString {
    pub left_anchor: [FT; 2],
    pub right_anchor: [FT; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneObstacle {
    pub center: [FT; 2],
    pub size: [FT; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    pub bounds: SceneBounds,
    pub fluid: SceneFluidBlock,
    pub solid: SceneSolidRing,
    pub string: SceneString,
    #[serde(default)]
    pub obstacles: Vec<SceneObstacle>,
}

/**
 * Owns the three solvers and enforces the per-step order: the coupling
 * pass reads the string's post-integration state and writes fluid
 * external forces before the fluid's integration consumes them.
 */
pub struct Sandbox {
    pub fluid: FluidSolver,
    pub string: StringSolver,
    pub coupling: CouplingField,
    pub time: FT,
    step_number: usize,
}

impl Sandbox {
    pub fn step(&mut self, dt: FT) {
        self.string.step(dt);
        self.coupling.apply(&self.string, &mut self.fluid);
        self.fluid.step(dt);

        self.time += dt;
        self.step_number += 1;
    }

    pub fn step_number(&self) -> usize {
        self.step_number
    }
}

pub fn init_sandbox(config: &SimulationConfig, scene: &SceneConfig) -> Result<Sandbox, String> {
    let bounds_size = vec2f(scene.bounds.width, scene.bounds.height);

    let num_particles = scene.fluid.num_particles;
    if num_particles == 0 {
        return Err("scene must place at least one fluid particle".to_string());
    }

    // centered square grid of fluid particles
    let particles_per_row = (num_particles as FT).sqrt() as usize;
    let particles_per_col = (num_particles - 1) / particles_per_row + 1;

    let mut positions = Vec::with_capacity(num_particles);
    for i in 0..num_particles {
        let x = (i % particles_per_row) as FT - particles_per_row as FT / 2.;
        let y = (i / particles_per_row) as FT - particles_per_col as FT / 2.;
        positions.push(vec2f(x * scene.fluid.spacing, y * scene.fluid.spacing));
    }
    let velocities: Vec<V2> = vec![zero(); num_particles];

    let boundary = BoundaryField::new(
        bounds_size,
        scene.solid.spacing_radius,
        scene.solid.num_solid,
        config.fluid.target_density,
    )?;

    let obstacles: Vec<Aabb> = scene
        .obstacles
        .iter()
        .map(|obstacle| Aabb {
            center: vec2f(obstacle.center[0], obstacle.center[1]),
            half_size: vec2f(obstacle.size[0] / 2., obstacle.size[1] / 2.),
        })
        .collect();

    let fluid = FluidSolver::new(positions, velocities, boundary, obstacles, bounds_size, config.fluid)?;

    let string = StringSolver::new(
        vec2f(scene.string.left_anchor[0], scene.string.left_anchor[1]),
        vec2f(scene.string.right_anchor[0], scene.string.right_anchor[1]),
        config.string,
    )?;

    Ok(Sandbox {
        fluid,
        string,
        coupling: CouplingField::new(config.coupling),
        time: 0.,
        step_number: 0,
    })
}

#[cfg(test)]
fn test_configs() -> (SimulationConfig, SceneConfig) {
    let config = SimulationConfig {
        fluid: FluidParams::default(),
        string: StringParams {
            num_segments: 8,
            ..StringParams::default()
        },
        coupling: CouplingParams::default(),
    };
    let scene = SceneConfig {
        bounds: SceneBounds { width: 8.0, height: 6.0 },
        fluid: SceneFluidBlock {
            num_particles: 36,
            spacing: 0.3,
        },
        solid: SceneSolidRing {
            spacing_radius: 0.2,
            num_solid: None,
        },
        string: SceneString {
            left_anchor: [-2.5, 1.0],
            right_anchor: [2.5, 1.0],
        },
        obstacles: vec![SceneObstacle {
            center: [0.0, -1.5],
            size: [1.0, 0.5],
        }],
    };
    (config, scene)
}

#[test]
fn scene_initialization_places_everything() {
    let (config, scene) = test_configs();
    let sandbox = init_sandbox(&config, &scene).unwrap();

    assert_eq!(sandbox.fluid.particle_count(), 36);
    assert_eq!(sandbox.string.node_count(), 10);
    assert!(sandbox.fluid.particle_position(0).norm() < 4.);
}

#[test]
fn stepping_keeps_particles_inside_the_bounds() {
    let (config, scene) = test_configs();
    let mut sandbox = init_sandbox(&config, &scene).unwrap();
    sandbox.string.pluck_string(0.5, 0.3);

    let dt = 1. / 120.;
    for _ in 0..60 {
        sandbox.step(dt);
    }

    assert!(sandbox.time > 0.49 && sandbox.time < 0.51);
    assert_eq!(sandbox.step_number(), 60);

    let half_width = scene.bounds.width / 2.;
    let half_height = scene.bounds.height / 2.;
    for i in 0..sandbox.fluid.particle_count() {
        let position = sandbox.fluid.particle_position(i);
        assert!(position.x.is_finite() && position.y.is_finite());
        assert!(position.x.abs() <= half_width, "particle {} escaped horizontally: {:?}", i, position);
        assert!(position.y.abs() <= half_height, "particle {} escaped vertically: {:?}", i, position);
    }
}

#[test]
fn empty_scene_is_rejected() {
    let (config, mut scene) = test_configs();
    scene.fluid.num_particles = 0;
    assert!(init_sandbox(&config, &scene).is_err());
}
