pub(crate) mod bootstrap;
mod controls;
pub(crate) mod loop_runner;
