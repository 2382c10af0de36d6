pub mod download;
pub mod restore;
