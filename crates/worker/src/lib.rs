pub mod delivery;
pub mod gateway;
pub mod render;
