pub mod admin;
pub mod employee;
pub mod finance;
pub mod health;
pub mod library;
pub mod student;
