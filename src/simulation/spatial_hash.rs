use crate::{floating_type_mod::FT, vec2i, IT, V2, V2I};

// The 9 cells in the grid (3x3) that surround a particle.
const CELL_OFFSETS: [[IT; 2]; 9] = [
    [-1, 1],
    [0, 1],
    [1, 1],
    [-1, 0],
    [0, 0],
    [1, 0],
    [-1, -1],
    [0, -1],
    [1, -1],
];

const NO_ENTRY: u32 = u32::MAX;

/**
 * Uniform grid over 2D space with hashed, array-backed cell lookup.
 *
 * Cell keys are the cell-coordinate hash reduced modulo the particle count,
 * so two distinct cells may share a bucket. Queries filter by actual
 * distance, which keeps results exact; aliasing only costs extra distance
 * checks. Fully rebuilt every step, pure read afterwards.
 */
pub struct SpatialHashGrid {
    // (particle index, cell key) pairs, sorted by key after `rebuild`
    entries: Vec<(u32, u32)>,

    // entry k holds the first position in `entries` whose key is k
    start_indices: Vec<u32>,

    // position snapshot from the last rebuild, used for distance filtering
    positions: Vec<V2>,

    cell_size: FT,
}

impl SpatialHashGrid {
    pub fn new(num_particles: usize) -> Result<SpatialHashGrid, String> {
        if num_particles == 0 {
            return Err(
                "spatial hash grid needs at least one particle (cell keys are reduced modulo the particle count)"
                    .to_string(),
            );
        }

        Ok(SpatialHashGrid {
            entries: vec![(0, 0); num_particles],
            start_indices: vec![NO_ENTRY; num_particles],
            positions: Vec::with_capacity(num_particles),
            cell_size: 0.,
        })
    }

    pub fn num_particles(&self) -> usize {
        self.entries.len()
    }

    /// Bucket key of an integer cell coordinate: hash reduced modulo the
    /// particle count.
    pub fn cell_key(&self, cell: V2I) -> u32 {
        self.key_from_hash(hash_cell(cell))
    }

    pub fn rebuild(&mut self, positions: &[V2], cell_size: FT) {
        assert!(
            positions.len() == self.entries.len(),
            "grid was sized for {} particles but got {} positions",
            self.entries.len(),
            positions.len()
        );
        assert!(cell_size > 0., "cell size must be positive (got {})", cell_size);

        self.cell_size = cell_size;
        self.positions.clear();
        self.positions.extend_from_slice(positions);

        let num_particles = positions.len() as u32;
        for (i, position) in positions.iter().enumerate() {
            let cell = position_to_cell(*position, cell_size);
            self.entries[i] = (i as u32, hash_cell(cell) % num_particles);
            self.start_indices[i] = NO_ENTRY;
        }

        self.entries.sort_unstable_by_key(|&(_, key)| key);

        for i in 0..self.entries.len() {
            let key = self.entries[i].1;
            let key_prev = if i == 0 { NO_ENTRY } else { self.entries[i - 1].1 };
            if key != key_prev {
                self.start_indices[key as usize] = i as u32;
            }
        }
    }

    /**
     * Visits every particle within `radius` of `point` with its index and
     * distance, by scanning the buckets of the 9 cells around the point's
     * home cell.
     */
    pub fn for_each_in_surrounding_cells(&self, point: V2, radius: FT, mut visitor: impl FnMut(usize, FT)) {
        let centre = position_to_cell(point, self.cell_size);
        let sqr_radius = radius * radius;

        for offset in CELL_OFFSETS {
            let key = self.cell_key(vec2i(centre.x + offset[0], centre.y + offset[1]));
            let start = self.start_indices[key as usize];
            if start == NO_ENTRY {
                continue;
            }

            for &(particle_index, entry_key) in &self.entries[start as usize..] {
                if entry_key != key {
                    break;
                }

                let sqr_dist = (self.positions[particle_index as usize] - point).norm_squared();
                if sqr_dist <= sqr_radius {
                    visitor(particle_index as usize, sqr_dist.sqrt());
                }
            }
        }
    }

    fn key_from_hash(&self, hash: u32) -> u32 {
        hash % self.entries.len() as u32
    }
}

fn position_to_cell(point: V2, cell_size: FT) -> V2I {
    vec2i((point.x / cell_size).floor() as IT, (point.y / cell_size).floor() as IT)
}

pub fn hash_cell(cell: V2I) -> u32 {
    let a = (cell.x as u32).wrapping_mul(15823);
    let b = (cell.y as u32).wrapping_mul(9737333);
    a.wrapping_add(b)
}

#[test]
fn zero_particles_is_a_configuration_error() {
    assert!(SpatialHashGrid::new(0).is_err());

    let grid = SpatialHashGrid::new(1).unwrap();
    assert_eq!(grid.num_particles(), 1);
    assert_eq!(grid.cell_key(vec2i(3, -7)), 0);
}

#[test]
fn query_matches_brute_force_on_random_layout() {
    use crate::vec2f;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let num_particles = 300;
    let radius: FT = 0.5;

    let positions: Vec<V2> = (0..num_particles)
        .map(|_| vec2f(rng.gen_range(-4.0..4.0), rng.gen_range(-3.0..3.0)))
        .collect();

    let mut grid = SpatialHashGrid::new(num_particles).unwrap();
    grid.rebuild(&positions, radius);

    for _ in 0..50 {
        let point = vec2f(rng.gen_range(-4.0..4.0), rng.gen_range(-3.0..3.0));

        let mut from_grid: Vec<usize> = Vec::new();
        grid.for_each_in_surrounding_cells(point, radius, |i, dist| {
            assert!(dist <= radius);
            from_grid.push(i);
        });
        from_grid.sort();

        let brute_force: Vec<usize> = (0..num_particles)
            .filter(|&i| (positions[i] - point).norm() <= radius)
            .collect();

        assert_eq!(from_grid, brute_force);
    }
}

#[test]
fn query_is_exact_on_collision_free_layout() {
    use crate::vec2f;

    // 50 particles spread over the cells (0,0), (1,0), (0,1), (1,1); the
    // four cell keys are distinct modulo 50, so no bucket aliasing occurs
    let num_particles = 50;
    let cell_size: FT = 1.0;

    let cells = [vec2i(0, 0), vec2i(1, 0), vec2i(0, 1), vec2i(1, 1)];
    let mut keys: Vec<u32> = cells
        .iter()
        .map(|&cell| hash_cell(cell) % num_particles as u32)
        .collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), cells.len(), "layout must be collision-free for this test");

    let positions: Vec<V2> = (0..num_particles)
        .map(|i| {
            let cell = cells[i % cells.len()];
            vec2f(
                cell.x as FT + 0.1 + 0.015 * (i / cells.len()) as FT,
                cell.y as FT + 0.1 + 0.015 * (i / cells.len()) as FT,
            )
        })
        .collect();

    let mut grid = SpatialHashGrid::new(num_particles).unwrap();
    grid.rebuild(&positions, cell_size);

    let point = vec2f(1.0, 1.0);
    let radius = 0.9;

    let mut from_grid: Vec<usize> = Vec::new();
    grid.for_each_in_surrounding_cells(point, radius, |i, _| from_grid.push(i));
    from_grid.sort();

    let brute_force: Vec<usize> = (0..num_particles)
        .filter(|&i| (positions[i] - point).norm() <= radius)
        .collect();

    assert_eq!(from_grid, brute_force);
    assert!(!from_grid.is_empty());
}
