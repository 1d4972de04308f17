//! Built-in render strategies.
//!
//! - [`GradientStrategy`] (`"gradient"`): graphics only, a full-screen
//!   triangle shading an animated color field.
//! - [`ParticlesStrategy`] (`"particles"`): a compute pass integrates a
//!   particle buffer that the graphics pass then draws as instanced quads.

mod gradient;
mod particles;

pub use gradient::GradientStrategy;
pub use particles::{Particle, ParticlesStrategy};

use crate::frame_manager::FrameManager;
use crate::strategy::RenderStrategy;

/// Names of the built-in strategies, in registration order.
pub const BUILTIN_STRATEGIES: [&str; 2] = [GradientStrategy::NAME, ParticlesStrategy::NAME];

/// Creates every built-in strategy for `frames_in_flight` slots.
pub fn builtin_strategies(frames_in_flight: usize) -> Vec<Box<dyn RenderStrategy<FrameManager>>> {
    vec![
        Box::new(GradientStrategy::new()),
        Box::new(ParticlesStrategy::new(frames_in_flight)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_strategies_registration_order() {
        let strategies = builtin_strategies(2);
        let names: Vec<&str> = strategies.iter().map(|s| s.name()).collect();
        assert_eq!(names, BUILTIN_STRATEGIES);
    }

    #[test]
    fn test_only_particles_run_compute() {
        let strategies = builtin_strategies(2);
        let compute: Vec<bool> = strategies.iter().map(|s| s.needs_compute()).collect();
        assert_eq!(compute, vec![false, true]);
    }
}
