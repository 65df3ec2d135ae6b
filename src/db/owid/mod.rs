pub mod covid_archive;
