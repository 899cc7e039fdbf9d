pub mod backup;
pub mod show;
