pub mod csv_table;
pub mod file;
pub mod stdin;
