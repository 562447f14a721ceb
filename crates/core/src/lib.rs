pub mod attributes;
pub mod callbacks;
pub mod error;
pub mod query;
pub mod record;
pub mod schema;
pub mod validation;
pub mod value;

pub use attributes::{AttributeStore, Existence};
pub use callbacks::{Action, Applicability, Callback, CallbackRegistry, CallbackSet, Hook, HookReport};
pub use error::CoreError;
pub use query::{Fragment, Params};
pub use record::Record;
pub use schema::{EntityType, EntityTypeBuilder, Field, FieldKind, PrimaryKey};
pub use validation::{Rule, UniquenessProbe};
pub use value::{Criterion, Row, Value};
