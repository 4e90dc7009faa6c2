pub mod envelope;
pub mod health;
pub mod notification;
pub mod records;
pub mod retry;
pub mod routing;
pub mod status;
