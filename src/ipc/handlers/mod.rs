pub mod comments;
pub mod core;
pub mod courses;
pub mod notifications;
pub mod schedule;
pub mod users;
