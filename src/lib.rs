pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod harness;
pub mod health;
pub mod sources;
pub mod utils;

pub use config::{CliConfig, FileConfig, Settings};
pub use core::{engine::Engine, pagination::paginate};
pub use domain::model::{ErrorType, Item, Query, QueryError, QueryMethod, QueryResult, Response, Scope};
pub use domain::ports::{Connectivity, Message, QueryStream, Source, Transport};
pub use utils::error::{Result, SourceError};
