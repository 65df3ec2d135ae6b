pub mod owid;
