pub mod csv;

pub use csv::{
    load_line_items, load_line_items_from_path, load_references, load_references_from_path,
    LineItemColumns, LoadError, ReferenceColumns,
};
