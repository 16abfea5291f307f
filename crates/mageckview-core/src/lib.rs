//! MAGeCKView core: the data layer behind the MAGeCK screen viewer.
//!
//! Gene- and guide-level results of a CRISPR screen are held in memory and
//! served to a table/plot front end as DataTables-style pages.
//!
//! ## Components
//!
//! - `predicate`: filter criteria compiled into record predicates
//! - `query`: incremental filter/order/page engine with structural caches
//! - `normalize`: per-sample count factors (`raw`, `total`, `median`, `control`)
//! - `merge`: guide statistics joined with counts and library membership
//! - `session`: one loaded screen, its display scheme and gene selection
//! - `series`, `export`: plot series and TSV downloads
//!
//! Everything is synchronous; a host that must not block can run these calls
//! on a worker of its own.

pub mod config;
pub mod error;
pub mod export;
pub mod merge;
pub mod normalize;
pub mod predicate;
pub mod query;
pub mod record;
pub mod schema;
pub mod selection;
pub mod series;
pub mod session;
pub mod signature;

pub use config::{SearchMode, ViewerConfig};
pub use error::{Result, ViewError};
pub use merge::{merge, CountTable, Library, LibraryAssignment};
pub use normalize::{NormalizationEngine, NormalizationFactorSet, Scheme};
pub use predicate::{FilterCriterion, Logic, Operator, Predicate, ValueType};
pub use query::{
    DumpKind, OrderDescriptor, Page, PageRequest, QueryEngine, QueryRequest, SearchDescriptor,
    SortDirection,
};
pub use record::{Direction, DirectionStats, GeneRecord, GuideRecord, GuideStats, Sample};
pub use schema::{Schema, ScreenRecord};
pub use selection::GeneSelection;
pub use series::Scale;
pub use session::{GuideRow, ScreenDataset, ScreenSession};
