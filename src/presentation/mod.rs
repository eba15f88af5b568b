pub mod studio;
pub mod views;
