mod core;
mod ops;

pub(crate) use self::core::Stored;
pub use self::core::Model;
pub use ops::apply_update;
