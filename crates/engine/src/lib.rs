pub mod scheduler;
pub mod status;
pub mod subscription;
