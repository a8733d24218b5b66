pub mod db;
mod files;
pub mod models;
pub mod object_id;
pub mod store;
mod tables;
pub mod transaction;

pub use db::{Database, DatabaseError};
pub use object_id::{InvalidObjectId, ObjectId};
pub use store::{MetadataStore, MetadataTransaction};
pub use tables::*;
pub use transaction::FileTransaction;
