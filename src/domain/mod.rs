//! Domain Layer
//!
//! Value objects, ports and update events shared by the map layer and the
//! adapters.
//!
//! - **Keys** (`key.rs`) - composite key derivation
//! - **Values** (`value.rs`) - the value carrier and combine operations
//! - **Ports** (`ports.rs`) - trait abstractions for both storage tiers
//! - **Events** (`events.rs`) - update notifications

pub mod events;
pub mod key;
pub mod ports;
pub mod value;

pub use events::{UpdateAction, UpdateEvent, UpdatePhase};
pub use key::CompositeKey;
pub use ports::{CacheBackend, DurableStore, TableAdmin, TableSpec, UpdateListener};
pub use value::{member_set, Member, Number, Value, EMPTY_SET_SENTINEL};
