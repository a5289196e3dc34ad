/*!
2D SPH fluid sandbox coupled to a discretized vibrating string.

The numerical core lives in `simulation`; the binary in `main.rs` is a thin
headless runner around it.
*/

mod simulation;

pub use simulation::*;
