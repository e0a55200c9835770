pub mod config;
pub mod interest;
pub mod publish;
