//! Reading SpreadsheetML template catalogs: structural pre-check, typed
//! document tree, and row extraction.

pub mod parse;
pub mod validate;
pub mod workbook;

pub use parse::{parse, CATALOG_COLUMNS};
pub use validate::{check, validate};
