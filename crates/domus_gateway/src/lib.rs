pub mod registry;
pub mod server;

pub use registry::SocketRegistry;
pub use server::GatewayServer;
