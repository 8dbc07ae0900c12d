mod dialect;
mod mysql;
mod postgres;
mod rows;
mod sqlite;

pub use dialect::*;
pub use mysql::*;
pub use postgres::*;
pub use rows::*;
pub use sqlite::*;
