pub mod admin;
pub mod common;
pub mod employee;
pub mod library;
pub mod student;
pub mod transaction;
