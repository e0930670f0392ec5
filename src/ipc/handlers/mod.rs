pub mod admin_users;
pub mod assignments;
pub mod class_alerts;
pub mod class_attendance;
pub mod class_performance;
pub mod class_reports;
pub mod class_students;
pub mod core;
pub mod grading;
pub mod messages;
pub mod notifications;
pub mod setup;
