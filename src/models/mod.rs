pub mod pickup;
pub mod tps;
pub mod user;
