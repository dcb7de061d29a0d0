pub mod assignments;
pub mod averages;
pub mod backup_exchange;
pub mod classes;
pub mod core;
pub mod grades;
pub mod students;
pub mod weights;
