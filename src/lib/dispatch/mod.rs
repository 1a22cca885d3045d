pub mod dispatcher;
pub mod entry;
pub mod plan;
pub mod types;
