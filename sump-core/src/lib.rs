mod connection;
mod document;
mod meta;
mod query;
mod querier;
mod record;
mod repository;
mod schema;
mod sql;
mod util;
mod value;

pub use ::anyhow::Context;
pub use connection::*;
pub use document::*;
pub use meta::*;
pub use query::*;
pub use querier::*;
pub use record::*;
pub use repository::*;
pub use schema::*;
pub use sql::*;
pub use util::*;
pub use value::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
