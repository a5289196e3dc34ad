use crate::{floating_type_mod::FT, vec2f, V2};

/**
 * A fixed ring of solid particles along the four edges of the simulation
 * rectangle. Each particle carries the fluid's target density as a
 * constant, so pressure contributions push fluid particles away from the
 * walls symmetrically with interior pressure. Created once, never moved.
 */
pub struct BoundaryField {
    positions: Vec<V2>,
    density: FT,
}

impl BoundaryField {
    pub fn new(
        bounds_size: V2,
        spacing_radius: FT,
        max_count: Option<usize>,
        target_density: FT,
    ) -> Result<BoundaryField, String> {
        if !(spacing_radius > 0.) {
            return Err(format!("solid spacing radius must be positive (got {})", spacing_radius));
        }
        if !(target_density > 0.) {
            return Err(format!("solid target density must be positive (got {})", target_density));
        }

        let half = bounds_size * 0.5;
        let step = 2. * spacing_radius;
        let num_horizontal = (bounds_size.x / step).floor() as i32 + 1;
        let num_vertical = (bounds_size.y / step).floor() as i32 + 1;

        let mut positions = Vec::new();
        for edge in [0, 1, 2, 3] {
            // the rows sit one spacing radius outside the bounds
            let (start, dir, num_particles_on_edge) = match edge {
                0 => (vec2f(-half.x, half.y + spacing_radius), vec2f(step, 0.), num_horizontal),
                1 => (vec2f(-half.x, -half.y - spacing_radius), vec2f(step, 0.), num_horizontal),
                2 => (vec2f(-half.x - spacing_radius, -half.y), vec2f(0., step), num_vertical),
                3 => (vec2f(half.x + spacing_radius, -half.y), vec2f(0., step), num_vertical),
                _ => unreachable!(),
            };

            for i in 0..num_particles_on_edge {
                positions.push(start + dir * i as FT);
            }
        }

        if let Some(max_count) = max_count {
            positions.truncate(max_count);
        }

        Ok(BoundaryField {
            positions,
            density: target_density,
        })
    }

    pub fn positions(&self) -> &[V2] {
        &self.positions
    }

    pub fn density(&self) -> FT {
        self.density
    }

    pub fn num_solid_particles(&self) -> usize {
        self.positions.len()
    }
}

#[test]
fn ring_covers_all_four_edges_outside_the_bounds() {
    let bounds = vec2f(4.0, 2.0);
    let spacing_radius = 0.5;
    let boundary = BoundaryField::new(bounds, spacing_radius, None, 2.75).unwrap();

    // floor(4/1)+1 = 5 per horizontal edge, floor(2/1)+1 = 3 per vertical edge
    assert_eq!(boundary.num_solid_particles(), 2 * 5 + 2 * 3);

    let mut above = 0;
    let mut below = 0;
    let mut left = 0;
    let mut right = 0;
    for position in boundary.positions() {
        assert!(
            position.x.abs() > bounds.x / 2. || position.y.abs() > bounds.y / 2.,
            "solid particle {:?} lies inside the bounds",
            position
        );
        if position.y > bounds.y / 2. {
            above += 1;
        }
        if position.y < -bounds.y / 2. {
            below += 1;
        }
        if position.x < -bounds.x / 2. {
            left += 1;
        }
        if position.x > bounds.x / 2. {
            right += 1;
        }
    }
    assert_eq!(above, 5);
    assert_eq!(below, 5);
    assert_eq!(left, 3);
    assert_eq!(right, 3);
}

#[test]
fn explicit_count_truncates_the_ring() {
    let boundary = BoundaryField::new(vec2f(4.0, 2.0), 0.5, Some(10), 2.75).unwrap();
    assert_eq!(boundary.num_solid_particles(), 10);
}

#[test]
fn invalid_configuration_is_rejected() {
    assert!(BoundaryField::new(vec2f(4.0, 2.0), 0., None, 2.75).is_err());
    assert!(BoundaryField::new(vec2f(4.0, 2.0), 0.5, None, 0.).is_err());
}
