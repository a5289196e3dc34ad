use nalgebra::zero;

use crate::{
    floating_type_mod::{FT, PI},
    simulation_parameters::StringParams,
    vec2f, V2,
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum DragState {
    Idle,
    Dragging { node: usize, target: V2 },
}

struct TimedForce {
    node: usize,
    force: V2,
    remaining: FT,
}

/**
 * Discretized vibrating string: two pinned anchor nodes plus
 * `num_segments` interior nodes, advanced by an explicit finite-difference
 * step of the wave equation with bending stiffness, followed by an
 * iterative distance-constraint relaxation.
 */
pub struct StringSolver {
    positions: Vec<V2>,
    prev_positions: Vec<V2>,
    velocities: Vec<V2>,

    left_anchor: V2,
    right_anchor: V2,

    params: StringParams,
    drag: DragState,
    timed_forces: Vec<TimedForce>,
}

impl StringSolver {
    pub fn new(left_anchor: V2, right_anchor: V2, params: StringParams) -> Result<StringSolver, String> {
        if params.num_segments == 0 {
            return Err("string needs at least one interior node".to_string());
        }
        if !(left_anchor.x.is_finite()
            && left_anchor.y.is_finite()
            && right_anchor.x.is_finite()
            && right_anchor.y.is_finite())
        {
            return Err("string anchors must be assigned finite positions".to_string());
        }
        if !(params.linear_density > 0.) {
            return Err(format!("linear density must be positive (got {})", params.linear_density));
        }

        let num_nodes = params.num_segments + 2;
        let mut positions = Vec::with_capacity(num_nodes);

        positions.push(left_anchor);
        for i in 1..=params.num_segments {
            let t = i as FT / (params.num_segments + 1) as FT;
            let mut position = left_anchor.lerp(&right_anchor, t);
            // slight initial curve
            position.y -= params.initial_sag * (i as FT * PI / params.num_segments as FT).sin();
            positions.push(position);
        }
        positions.push(right_anchor);

        Ok(StringSolver {
            prev_positions: positions.clone(),
            velocities: vec![zero(); num_nodes],
            positions,
            left_anchor,
            right_anchor,
            params,
            drag: DragState::Idle,
            timed_forces: Vec::new(),
        })
    }

    /**
     * One explicit step: acceleration from the wave equation with
     * stiffness (mu d²u/dt² - T d²u/dx² + EI d⁴u/dx⁴ = 0) plus gravity and
     * damping, velocity and position integration, anchor pinning and
     * distance-constraint relaxation, and finally a velocity recompute
     * from the net position change so the constraint corrections cannot
     * pump energy into the explicit integration.
     */
    pub fn step(&mut self, dt: FT) {
        assert!(dt > 0., "step size must be positive (got {})", dt);

        let num_nodes = self.positions.len();
        let dragged_node = match self.drag {
            DragState::Dragging { node, .. } => Some(node),
            DragState::Idle => None,
        };

        self.prev_positions.copy_from_slice(&self.positions);

        // sustained excitation forces (plucking/hammering)
        for timed_force in &mut self.timed_forces {
            self.velocities[timed_force.node] += timed_force.force * dt;
            timed_force.remaining -= dt;
        }
        self.timed_forces.retain(|timed_force| timed_force.remaining > 0.);

        let segment_length = self.params.string_length / (self.params.num_segments + 1) as FT;

        for i in 1..num_nodes - 1 {
            if Some(i) == dragged_node {
                continue;
            }

            let left = self.positions[i - 1];
            let right = self.positions[i + 1];
            let mut acceleration: V2 = zero();

            // second spatial derivative: tension
            let d2x = left - 2. * self.positions[i] + right;
            acceleration +=
                (self.params.tension / self.params.linear_density) * d2x / (segment_length * segment_length);

            // fourth spatial derivative: bending resistance, only for nodes
            // with two neighbors on each side
            if i > 1 && i < num_nodes - 2 {
                let left_left = self.positions[i - 2];
                let right_right = self.positions[i + 2];
                let d4x = left_left - 4. * left + 6. * self.positions[i] - 4. * right + right_right;

                // moment of inertia of the circular cross-section
                let moment_of_inertia = PI * self.params.string_radius.powi(4) / 4.;
                acceleration -= (self.params.youngs_modulus * moment_of_inertia / self.params.linear_density) * d4x
                    / segment_length.powi(4);
            }

            acceleration += vec2f(0., -self.params.gravity);
            acceleration -= self.params.damping * self.velocities[i];

            self.velocities[i] += acceleration * dt;
        }

        let positions_before_integration = self.positions.clone();

        for i in 1..num_nodes - 1 {
            if Some(i) != dragged_node {
                self.positions[i] += self.velocities[i] * dt;
            }
        }

        if let DragState::Dragging { node, target } = self.drag {
            self.positions[node] = self.positions[node].lerp(&target, self.params.interaction_strength);
            self.velocities[node] = zero();
        }

        self.apply_constraints(dragged_node);

        // reflect the constraint corrections back into velocity
        for i in 1..num_nodes - 1 {
            if Some(i) != dragged_node {
                self.velocities[i] = (self.positions[i] - positions_before_integration[i]) / dt;
            }
        }
    }

    fn apply_constraints(&mut self, dragged_node: Option<usize>) {
        let num_nodes = self.positions.len();

        // the ends are fixed to the anchor points
        self.positions[0] = self.left_anchor;
        self.positions[num_nodes - 1] = self.right_anchor;

        let ideal_distance = (self.right_anchor - self.left_anchor).norm() / (self.params.num_segments + 1) as FT;

        for _ in 0..self.params.iterations {
            for i in 1..num_nodes - 1 {
                if Some(i) == dragged_node {
                    continue;
                }

                // constraint with the previous node
                let dir = self.positions[i] - self.positions[i - 1];
                let dist = dir.norm();
                if dist > 0. {
                    let correction = dir * (1. - ideal_distance / dist) * 0.5;
                    self.positions[i] -= correction;
                    if i - 1 > 0 && Some(i - 1) != dragged_node {
                        self.positions[i - 1] += correction;
                    }
                }

                // constraint with the next node
                let dir = self.positions[i] - self.positions[i + 1];
                let dist = dir.norm();
                if dist > 0. {
                    let correction = dir * (1. - ideal_distance / dist) * 0.5;
                    self.positions[i] -= correction;
                    if i + 1 < num_nodes - 1 && Some(i + 1) != dragged_node {
                        self.positions[i + 1] += correction;
                    }
                }
            }
        }
    }

    /**
     * Pointer-down event with the pointer's world-space position (the host
     * projects its screen ray onto the simulation plane). Picks the
     * closest interior node within the interaction radius; returns whether
     * one was picked.
     */
    pub fn pointer_down(&mut self, point: V2) -> bool {
        let mut closest_node = None;
        let mut min_dist = self.params.interaction_radius;

        for i in 1..self.positions.len() - 1 {
            let dist = (self.positions[i] - point).norm();
            if dist < min_dist {
                min_dist = dist;
                closest_node = Some(i);
            }
        }

        match closest_node {
            Some(node) => {
                self.drag = DragState::Dragging { node, target: point };
                true
            }
            None => false,
        }
    }

    pub fn pointer_moved(&mut self, point: V2) {
        if let DragState::Dragging { node, .. } = self.drag {
            self.drag = DragState::Dragging { node, target: point };
        }
    }

    pub fn pointer_up(&mut self) {
        self.drag = DragState::Idle;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag != DragState::Idle
    }

    /// One-shot displacement of the interior node nearest to the
    /// normalized position (0 = left anchor, 1 = right anchor).
    pub fn pluck_string(&mut self, normalized_position: FT, amplitude: FT) {
        let index = (normalized_position * self.params.num_segments as FT).round() as i64 + 1;
        if index > 0 && (index as usize) < self.positions.len() - 1 {
            self.positions[index as usize].y += amplitude;
        }
    }

    /// Sustained acceleration on one interior node for a time window,
    /// applied at the start of every step until the window has elapsed.
    pub fn apply_force(&mut self, node_index: usize, force: V2, duration: FT) {
        if node_index > 0 && node_index < self.positions.len() - 1 && duration > 0. {
            self.timed_forces.push(TimedForce {
                node: node_index,
                force,
                remaining: duration,
            });
        }
    }

    pub fn set_anchors(&mut self, left_anchor: V2, right_anchor: V2) {
        self.left_anchor = left_anchor;
        self.right_anchor = right_anchor;
    }

    /// Live node list including both anchors; contents change every step.
    pub fn positions(&self) -> &[V2] {
        &self.positions
    }

    pub fn velocities(&self) -> &[V2] {
        &self.velocities
    }

    /// Node positions as they were at the start of the most recent step.
    pub fn prev_positions(&self) -> &[V2] {
        &self.prev_positions
    }

    pub fn node_count(&self) -> usize {
        self.positions.len()
    }
}

#[cfg(test)]
fn quiet_params() -> StringParams {
    StringParams {
        string_length: 10.0,
        tension: 10.0,
        linear_density: 1.0,
        youngs_modulus: 0.0,
        damping: 0.1,
        gravity: 0.0,
        num_segments: 3,
        iterations: 10,
        initial_sag: 0.0,
        ..StringParams::default()
    }
}

#[test]
fn configuration_errors_are_fatal_at_construction() {
    let params = StringParams {
        num_segments: 0,
        ..quiet_params()
    };
    assert!(StringSolver::new(vec2f(-5., 0.), vec2f(5., 0.), params).is_err());

    assert!(StringSolver::new(vec2f(FT::NAN, 0.), vec2f(5., 0.), quiet_params()).is_err());

    let params = StringParams {
        linear_density: 0.,
        ..quiet_params()
    };
    assert!(StringSolver::new(vec2f(-5., 0.), vec2f(5., 0.), params).is_err());
}

#[test]
fn straight_force_free_string_stays_in_equilibrium() {
    use crate::assert_ft_approx_eq;

    let mut string = StringSolver::new(vec2f(-5., 0.), vec2f(5., 0.), quiet_params()).unwrap();
    let initial: Vec<V2> = string.positions().to_vec();

    string.step(0.01);

    for (i, position) in string.positions().iter().enumerate() {
        assert_ft_approx_eq(position.x, initial[i].x, 1e-4, || format!("node {} x", i));
        assert_ft_approx_eq(position.y, initial[i].y, 1e-4, || format!("node {} y", i));
    }
    assert_eq!(string.prev_positions(), &initial[..]);
}

#[test]
fn anchors_follow_the_external_transforms() {
    let mut string = StringSolver::new(vec2f(-5., 0.), vec2f(5., 0.), quiet_params()).unwrap();

    string.set_anchors(vec2f(-5., 1.), vec2f(5., 1.));
    string.step(0.01);

    assert_eq!(string.positions()[0], vec2f(-5., 1.));
    assert_eq!(string.positions()[4], vec2f(5., 1.));
}

#[test]
fn constraints_converge_to_the_ideal_segment_length() {
    let params = StringParams {
        iterations: 50,
        damping: 2.0,
        ..quiet_params()
    };
    let mut string = StringSolver::new(vec2f(-5., 0.), vec2f(5., 0.), params).unwrap();
    string.pluck_string(0.5, 0.2);

    for _ in 0..100 {
        string.step(0.01);
    }

    let ideal = 10.0 / 4.0;
    for i in 0..string.node_count() - 1 {
        let dist = (string.positions()[i + 1] - string.positions()[i]).norm();
        assert!(
            (dist - ideal).abs() / ideal < 0.01,
            "segment {} has length {} (ideal {})",
            i,
            dist,
            ideal
        );
    }

    // anchors stay pinned exactly
    assert_eq!(string.positions()[0], vec2f(-5., 0.));
    assert_eq!(string.positions()[4], vec2f(5., 0.));
}

#[test]
fn damping_dissipates_energy_over_time() {
    let params = StringParams {
        damping: 2.0,
        ..quiet_params()
    };
    let mut string = StringSolver::new(vec2f(-5., 0.), vec2f(5., 0.), params).unwrap();
    string.pluck_string(0.5, 0.3);

    let window_steps = 100;
    let num_windows = 4;
    let mut rms_per_window = Vec::new();

    for _ in 0..num_windows {
        let mut sum_sq = 0.;
        for _ in 0..window_steps {
            string.step(0.005);
            for velocity in string.velocities() {
                sum_sq += velocity.norm_squared();
            }
        }
        rms_per_window.push((sum_sq / window_steps as FT).sqrt());
    }

    // short-term overshoot between windows is allowed; the trend must decay
    assert!(
        rms_per_window[num_windows - 1] < rms_per_window[0] * 0.5,
        "rms speed must decay in the long run: {:?}",
        rms_per_window
    );
    for i in 0..num_windows - 1 {
        assert!(
            rms_per_window[i + 1] <= rms_per_window[i] * 1.25,
            "rms speed must not grow between windows: {:?}",
            rms_per_window
        );
    }
}

#[test]
fn pluck_displaces_the_nearest_interior_node() {
    let mut string = StringSolver::new(vec2f(-5., 0.), vec2f(5., 0.), quiet_params()).unwrap();

    string.pluck_string(0.5, 0.25);
    // round(0.5 * 3) + 1 = 3
    assert_eq!(string.positions()[3].y, 0.25);

    // out of range is a no-op
    let before: Vec<V2> = string.positions().to_vec();
    string.pluck_string(5.0, 1.0);
    assert_eq!(string.positions(), &before[..]);
}

#[test]
fn timed_force_builds_velocity_then_expires() {
    let mut string = StringSolver::new(vec2f(-5., 0.), vec2f(5., 0.), quiet_params()).unwrap();

    string.apply_force(2, vec2f(0., 50.), 0.025);
    string.step(0.01);
    assert!(string.velocities()[2].norm() > 0., "sustained force must move the node");
    assert_eq!(string.timed_forces.len(), 1);

    string.step(0.01);
    string.step(0.01);
    assert!(string.timed_forces.is_empty(), "force window must expire");

    // anchors and out-of-range nodes are rejected
    string.apply_force(0, vec2f(0., 50.), 1.0);
    string.apply_force(4, vec2f(0., 50.), 1.0);
    string.apply_force(99, vec2f(0., 50.), 1.0);
    assert!(string.timed_forces.is_empty());
}

#[test]
fn drag_state_machine_pins_the_picked_node() {
    let mut string = StringSolver::new(vec2f(-5., 0.), vec2f(5., 0.), quiet_params()).unwrap();

    // far away from every interior node: no pick
    assert!(!string.pointer_down(vec2f(0., 30.)));
    assert!(!string.is_dragging());

    // interior node 2 sits at the origin
    assert!(string.pointer_down(vec2f(0.1, 0.1)));
    assert!(string.is_dragging());

    string.pointer_moved(vec2f(0., 1.));
    string.step(0.01);

    let dragged = string.positions()[2];
    assert!(dragged.y > 0.2, "dragged node must blend toward the target (got {:?})", dragged);
    assert_eq!(string.velocities()[2], zero::<V2>());

    string.pointer_up();
    assert!(!string.is_dragging());
}
