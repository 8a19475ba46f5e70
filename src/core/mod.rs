pub mod engine;
pub mod pagination;

pub use crate::domain::model::{Item, Query, QueryError, QueryResult};
pub use crate::domain::ports::{QueryStream, Source};
pub use crate::utils::error::Result;
