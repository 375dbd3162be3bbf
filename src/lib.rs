pub mod pipeline;
pub mod snapshot;
pub mod sqlite_pragma;
