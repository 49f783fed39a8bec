pub mod fare;
pub mod lifecycle;
pub mod matching;
pub mod store;
pub mod timeout;
