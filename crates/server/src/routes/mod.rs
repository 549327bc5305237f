pub mod auth;
pub mod bookings;
pub mod contact;
pub mod dashboard;
pub mod services;
pub mod users;
