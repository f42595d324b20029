pub mod canonical;
pub mod error;
pub mod health;
pub mod lorodoc;
pub mod messages;
pub mod status;

pub use canonical::*;
pub use error::*;
pub use health::*;
pub use messages::*;
pub use status::*;
