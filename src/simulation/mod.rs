pub mod boundary;
pub mod concurrency;
pub mod coupling;
pub mod fluid;
pub mod sandbox;
pub mod simulation_parameters;
pub mod spatial_hash;
pub mod sph_kernels;
pub mod string_solver;

pub type IT = i32;

#[cfg(feature = "double-precision")]
pub mod floating_type_mod {
    pub type FT = f64;
    pub use std::f64::consts::PI;
}

#[cfg(not(feature = "double-precision"))]
pub mod floating_type_mod {
    pub type FT = f32;
    pub use std::f32::consts::PI;
}

use floating_type_mod::FT;

use nalgebra::SVector;

pub type V2 = SVector<FT, 2>;
pub type V2I = SVector<IT, 2>;

pub fn vec2f(x: FT, y: FT) -> V2 {
    [x, y].into()
}

pub fn vec2i(x: IT, y: IT) -> V2I {
    [x, y].into()
}

pub use boundary::*;
pub use coupling::*;
pub use fluid::*;
pub use sandbox::*;
pub use simulation_parameters::*;
pub use spatial_hash::*;
pub use string_solver::*;
