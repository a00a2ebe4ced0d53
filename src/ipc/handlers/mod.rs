pub mod admin;
pub mod admissions;
pub mod core;
pub mod profiles;
pub mod settings;
pub mod teacher;
pub mod todos;
