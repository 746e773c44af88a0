pub mod cart_order;
pub mod donation;
pub mod event;
pub mod location;
