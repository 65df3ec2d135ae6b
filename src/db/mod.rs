pub mod owid;
pub mod prod_db;
