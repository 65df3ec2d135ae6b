pub mod lib_postgres;
