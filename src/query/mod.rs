//! Query builder, predicate engine and cursor.

mod builder;
mod cursor;
mod eval;
mod exec;
mod parse;
mod types;

pub use builder::Query;
pub use cursor::Cursor;
pub use eval::{
    apply_slice, compare_bson, compare_docs, compare_keys, eval_clause, eval_clauses, get_path,
    project, sort_key, values_equal,
};
pub(crate) use eval::{get_path_mut, remove_path};
pub use parse::{parse_filter, parse_filter_json, parse_update};
pub use types::{
    Clause, DeleteReport, Op, Order, Projection, Slice, SortArg, SortSpec, UpdateDoc, UpdateReport,
};
