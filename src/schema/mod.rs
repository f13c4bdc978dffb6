//! Schema model.
//!
//! A [`Schema`] is built once, validated as a whole, and then only read: the
//! relation registry, the schema compiler and the facade all borrow it.
//!
//! ```
//! use keel::schema::{ModelBuilder, Schema};
//!
//! let schema = Schema::builder()
//!     .model(ModelBuilder::new("Post").id().string("title", false).belongs_to_many("Tag"))
//!     .model(ModelBuilder::new("Tag").id().string("label", false).unique())
//!     .build()?;
//!
//! assert_eq!(schema.pivot_tables()[0].name, "post_tag");
//! # Ok::<(), keel::schema::SchemaError>(())
//! ```

pub mod builder;
pub mod error;
pub mod field;
pub mod file;
pub mod model;
pub mod relation;

pub use builder::{ModelBuilder, SchemaBuilder};
pub use error::SchemaError;
pub use field::{DefaultValue, FieldAttribute, FieldSpec, FieldType};
pub use file::{load_schema, parse_schema, to_toml};
pub use model::{ModelDefinition, PivotKey, PivotTable, Schema};
pub use relation::{ReferentialAction, RelationKind, RelationSpec};
