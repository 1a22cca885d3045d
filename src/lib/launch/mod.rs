pub mod docker;
pub mod ecs;
pub mod secrets;
#[cfg(test)]
pub mod testing;
pub mod types;
