//! Route handler modules, one file per resource family, following the
//! teacher's flat `handlers/<noun>.rs` layout.

pub mod audit;
pub mod calendars;
pub mod health;
pub mod jobs;
pub mod robot_session;
pub mod robots;
pub mod schedules;
pub mod workflows;
