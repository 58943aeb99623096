//! A small deterministic world used as the process Context.
//!
//! Sources come and go on a fixed schedule so that memoized handles go stale
//! and threads have to react to `WORLD_CHANGED`.

use std::collections::BTreeMap;

use rethread_core::{Resolve, Tick};
use serde::{Deserialize, Serialize};

/// Published whenever the set of visible sources changes.
pub const WORLD_CHANGED: &str = "WORLD_CHANGED";

/// Ticks between layout changes.
pub const LAYOUT_PERIOD: Tick = 50;

const SOURCE_IDS: [&str; 3] = ["src-a", "src-b", "src-c"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub energy: u32,
    pub capacity: u32,
}

#[derive(Debug, Default)]
pub struct World {
    tick: Tick,
    layout: Option<Tick>,
    sources: BTreeMap<String, Source>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the world to `tick`. Returns `true` when the visible sources
    /// changed since the previous refresh.
    pub fn refresh(&mut self, tick: Tick) -> bool {
        let layout = tick / LAYOUT_PERIOD;
        let changed = self.layout.is_some_and(|previous| previous != layout);

        if self.layout != Some(layout) {
            // One source is hidden per layout, rotating through them.
            let hidden = (layout % SOURCE_IDS.len() as Tick) as usize;
            self.sources = SOURCE_IDS
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != hidden)
                .map(|(i, id)| {
                    let source = Source {
                        id: id.to_string(),
                        energy: 0,
                        capacity: 300 * (i as u32 + 1),
                    };
                    (id.to_string(), source)
                })
                .collect();
            self.layout = Some(layout);
        }

        let phase = (tick % LAYOUT_PERIOD + 1) as u32;
        for source in self.sources.values_mut() {
            source.energy = source.capacity * phase / LAYOUT_PERIOD as u32;
        }
        self.tick = tick;
        changed
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.values()
    }

    /// The source with the most stored energy, ties broken by id.
    pub fn richest_source(&self) -> Option<&Source> {
        self.sources
            .values()
            .max_by(|a, b| a.energy.cmp(&b.energy).then_with(|| b.id.cmp(&a.id)))
    }
}

impl Resolve<Source> for World {
    fn resolve(&self, id: &str) -> Option<Source> {
        self.sources.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rethread_core::Handle;

    fn ids(world: &World) -> Vec<&str> {
        world.sources().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn first_refresh_is_not_a_change() {
        let mut world = World::new();
        assert!(!world.refresh(0));
        assert_eq!(ids(&world), vec!["src-b", "src-c"]);
        assert_eq!(world.tick(), 0);
    }

    #[test]
    fn layout_rotates_every_period() {
        let mut world = World::new();
        world.refresh(0);
        assert!(!world.refresh(LAYOUT_PERIOD - 1));
        assert!(world.refresh(LAYOUT_PERIOD));
        assert_eq!(ids(&world), vec!["src-a", "src-c"]);
        assert!(world.refresh(2 * LAYOUT_PERIOD));
        assert_eq!(ids(&world), vec!["src-a", "src-b"]);
        assert!(world.refresh(3 * LAYOUT_PERIOD));
        assert_eq!(ids(&world), vec!["src-b", "src-c"]);
    }

    #[test]
    fn energy_fills_over_a_period() {
        let mut world = World::new();
        world.refresh(0);
        assert_eq!(world.resolve("src-b").unwrap().energy, 12);
        world.refresh(LAYOUT_PERIOD - 1);
        let src = world.resolve("src-c").unwrap();
        assert_eq!(src.energy, src.capacity);
        assert_eq!(world.richest_source().unwrap().id, "src-c");
    }

    #[test]
    fn handles_go_stale_when_layout_changes() {
        let mut world = World::new();
        world.refresh(0);
        let handle: Handle<Source> = Handle::new("src-b");
        assert!(handle.resolve(&world).is_ok());
        world.refresh(LAYOUT_PERIOD);
        assert!(handle.resolve(&world).is_err());
    }
}
