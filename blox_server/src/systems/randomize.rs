//! Periodically re-rolls size and color of entities marked `Randomize`.

use blox_shared::ecs::{Color, Randomize, Size};
use rand::Rng;

use crate::simulation::{Simulation, System};

pub struct RandomizeSystem;

impl System for RandomizeSystem {
    fn name(&self) -> &'static str {
        "randomize"
    }

    fn run(&mut self, sim: &mut Simulation, _dt: f32) {
        let every = sim.config.randomize_interval_ticks.max(1);
        if sim.tick % every != 0 {
            return;
        }
        for id in sim.world.with::<Randomize>() {
            let side = sim.rng.gen_range(0.5..2.0);
            let color = random_color(&mut sim.rng);
            sim.world.modify::<Size, _>(id, |s| *s = Size::uniform(side));
            sim.world.modify::<Color, _>(id, |c| *c = color);
        }
    }
}

pub fn random_color(rng: &mut impl Rng) -> Color {
    Color(format!("#{:06x}", rng.gen_range(0..=0xff_ffffu32)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::test_support::sim;
    use blox_shared::ecs::ComponentKind;

    #[test]
    fn rerolls_on_interval_only() {
        let mut sim = sim();
        let e = sim.world.spawn_networked();
        sim.world
            .add_component(&mut sim.events, e, Size::uniform(10.0))
            .unwrap();
        sim.world
            .add_component(&mut sim.events, e, Color("#000000".into()))
            .unwrap();
        sim.world
            .add_component(&mut sim.events, e, Randomize)
            .unwrap();
        sim.world.clear_dirty_flags();

        sim.tick = sim.config.randomize_interval_ticks + 1;
        RandomizeSystem.run(&mut sim, 0.05);
        assert_eq!(sim.world.get::<Size>(e), Some(&Size::uniform(10.0)));

        sim.tick = sim.config.randomize_interval_ticks * 2;
        RandomizeSystem.run(&mut sim, 0.05);
        let size = sim.world.get::<Size>(e).unwrap();
        assert!((0.5..2.0).contains(&size.width));
        assert!(sim.world.get_component(e, ComponentKind::Color).unwrap().is_dirty());
        let color = &sim.world.get::<Color>(e).unwrap().0;
        assert_eq!(color.len(), 7);
        assert!(color.starts_with('#'));
    }
}
