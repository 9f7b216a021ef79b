// Agent registry and visual tags

pub mod palette;
pub mod registry;

pub use palette::{ColorPalette, DEFAULT_PALETTE};
pub use registry::AgentRegistry;
