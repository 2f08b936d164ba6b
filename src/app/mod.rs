pub mod delivery_engine;
pub mod ports;
