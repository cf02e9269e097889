pub mod compactor;
pub mod config;
pub mod dates;
pub mod engine;
pub mod expand;
pub mod http;
pub mod limits;
pub mod migrate;
pub mod model;
pub mod observability;
pub mod occupation;
pub mod tenant;
pub mod wal;
