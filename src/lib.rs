// Clippy allows for reasonable defaults
#![allow(clippy::new_without_default)] // Default not always appropriate for stateful types
#![allow(clippy::derivable_impls)] // Explicit Default impls can be clearer
#![allow(clippy::field_reassign_with_default)] // Builder pattern is clearer
#![allow(clippy::unnecessary_map_or)] // map_or can be clearer than alternatives
#![allow(clippy::manual_map)] // Explicit match arms can be clearer

// Module declarations
pub mod agents;
pub mod applier;
pub mod config;
pub mod conflicts;
pub mod coordinator;
pub mod diff_zones;
pub mod error;
pub mod event_bus;
pub mod events;
pub mod models;
pub mod navigation;
pub mod replay;
pub mod utils;

pub use applier::{ApplyError, ApplyRequest, DiffApplier, NoopApplier, RecordingApplier};
pub use config::CoordinatorConfig;
pub use conflicts::ConflictPolicy;
pub use coordinator::EditCoordinator;
pub use error::{CoordinatorError, Result};
pub use event_bus::{EventBus, Subscription};
pub use events::{CoordinatorEvent, EventCategory, EventEnvelope};
pub use navigation::{NavigationSnapshot, UriOrder};
