pub mod boost;
pub mod delivery;
pub mod driver;
pub mod event;
pub mod fraud;
pub mod order;
pub mod settings;
