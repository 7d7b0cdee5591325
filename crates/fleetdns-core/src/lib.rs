// # fleetdns-core
//
// Core library for keeping DNS A records in line with the health of a proxy fleet.
//
// ## Architecture Overview
//
// - **HealthSource**: Trait reporting the health of every node in the fleet
// - **DnsProvider**: Trait listing, creating and deleting A records in a zone
// - **ChangeNotifier**: Trait observing record changes and failed actions
// - **reconcile::diff**: Pure function computing creates/deletes for one managed name
// - **ZoneResolver**: Domain to zone-ID lookup with a positive-only cache
// - **SyncEngine**: Convergence loop driving the diff across all zones on a timer
// - **ProviderRegistry**: Plugin-based registry for providers, sources and notifiers
//
// ## Design Principles
//
// 1. **Separation of Concerns**: The diff is pure; all I/O lives behind traits
// 2. **Convergent**: Records are re-listed every cycle, never cached
// 3. **Fault Isolation**: A failing zone or record never blocks the others
// 4. **Fail Safe**: No health snapshot means no DNS changes, never mass deletion
// 5. **Library-First**: All core functionality can be used as a library

pub mod traits;
pub mod reconcile;
pub mod zone;
pub mod engine;
pub mod registry;
pub mod config;
pub mod error;

// Re-export core types for convenience
pub use traits::{HealthSource, DnsProvider, ChangeNotifier, NoopNotifier};
pub use reconcile::{diff, DiffResult};
pub use zone::ZoneResolver;
pub use engine::{SyncEngine, EngineEvent, CycleReport};
pub use registry::ProviderRegistry;
pub use config::{SyncConfig, ZoneConfig, HealthSourceConfig, ProviderConfig, NotifierConfig};
pub use error::{Error, Result};
