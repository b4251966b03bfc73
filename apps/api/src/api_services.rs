mod redis;
mod state_builder;
mod sweepers;

pub use state_builder::build_app_state;
pub use sweepers::spawn_sweepers;
