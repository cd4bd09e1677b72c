mod core;
mod types;

pub(crate) use self::core::{set_path, unset_path};
pub use self::core::Document;
pub use types::DocumentState;
