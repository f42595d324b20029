pub mod connsession;
pub mod coordinator;
pub mod docsession;
pub mod gateway;
pub mod handler;
pub mod presence;
