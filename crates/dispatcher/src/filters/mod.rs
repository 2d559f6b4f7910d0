//! Built-in non-terminal filters

mod registered_label;
mod registry;

pub use self::registered_label::{RegisteredLabelFilter, REGISTERED_LABEL};
pub use self::registry::{LabelRegistry, MemoryRegistry, RegistryError};
