pub mod credentials;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod pacer;
pub mod providers;
pub mod scroll;
pub mod tool;
