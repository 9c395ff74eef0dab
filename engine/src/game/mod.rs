//! Mini-game overlay: spawned collectibles and pinch collection.

pub mod collect;
pub mod entity;

pub use collect::{CollectConfig, CollectOutcome, Collector, Inventory};
pub use entity::{Collectible, CollectibleKind, LifecycleEvent, SpawnConfig, Spawner};
