pub mod health;
pub mod restore;
