pub mod identity_client;
pub mod store_client;
