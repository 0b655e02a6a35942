pub mod events;
pub mod session;

pub use events::{GuildEvent, GuildSnapshot, IdentifyProperties};
pub use session::{GatewayConfig, GatewaySession};
