//! SQLite repositories
//!
//! Free functions over a `&SqlitePool`:
//! - `query` - filtered, sorted, paginated id queries and hydration
//! - `facets` - facet counts over a filtered result set
//! - `table` - single-row primitives per entity table
//! - `blob` - the `blobs` table and its references

pub mod blob;
pub mod facets;
pub mod query;
pub mod table;

pub use facets::{FacetOptions, FacetResult, get_facets};
pub use query::{FindOptions, QueryResult, SortDirection, compile_query, find_ids, find_many};
pub use table::{EntityRow, Table};
