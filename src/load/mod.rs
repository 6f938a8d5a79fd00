pub mod flat_file;
pub mod table;

pub use flat_file::{read_csv, write_csv};
pub use table::{open_db, open_mem_db, replace_table};
