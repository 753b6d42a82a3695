pub mod conductor;
pub mod config;
pub mod error;
pub mod game_module;
pub mod gatekeeper;
pub mod loom;
pub mod sentinel;
pub mod serial;
pub mod session;
pub mod tcpio;
pub mod tick;
pub mod udpio;
pub mod watcher;
pub mod weaver;

pub use conductor::{Component, ComponentState, Conductor, LoopComponent};
pub use config::{Config, NetworkConfig, SecurityConfig};
pub use error::{AuthError, ComponentError, HandshakeError, RegistryError, SessionError};
pub use game_module::GameModule;
pub use gatekeeper::GateKeeper;
pub use loom::Loom;
pub use sentinel::Sentinel;
pub use session::Vessel;
pub use tick::{TickDatagram, TickKind};
pub use udpio::DatagramIo;
pub use watcher::Watcher;
pub use weaver::Weaver;
