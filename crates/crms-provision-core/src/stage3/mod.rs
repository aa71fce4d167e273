pub mod columns;
pub mod provision;
pub mod record;
pub mod summary;
pub mod table;
