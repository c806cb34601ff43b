//! Performance references and their resolution
//!
//! A [`ReferenceTable`] is declared once per check and never mutated. At
//! judgment time a [`SelectorContext`] describing the instance (system,
//! partition, environ, scale parameters) is used to walk the table's
//! dimensions in order and pick the reference for a metric.

pub mod entry;
pub mod selector;
pub mod table;

pub use entry::{ReferenceEntry, ToleranceMode};
pub use selector::{split_fullname, Dimension, SelectorContext, SelectorValue};
pub use table::{Miss, ReferenceTable, ReferenceTableBuilder, Resolution};
