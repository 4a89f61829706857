pub mod backup_coordinator;
pub mod id_generator;
pub mod webdav;
