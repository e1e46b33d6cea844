#![forbid(unsafe_code)]

pub mod audit;
pub mod profile_db;
pub mod repo;
pub mod shared;

pub use profile_db::{IdentityCursor, OrphanCount, ProfileDb, StorageError};
pub use shared::SharedProfileDb;
