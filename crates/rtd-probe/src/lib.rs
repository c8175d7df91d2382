pub mod control;
pub mod infra;
pub mod runtime;
