mod core;
mod parse;
mod types;
pub(crate) mod validate;

pub use self::core::Schema;
pub use types::{
    FieldDef, FieldType, InstanceMethod, QueryHelper, SchemaOptions, StaticMethod, VirtualField,
    VirtualGetter, VirtualSetter,
};
