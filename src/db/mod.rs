mod connection;
mod introspect;
mod query;
mod schema;

pub use connection::*;
pub use introspect::*;
pub use query::*;
pub use schema::*;
