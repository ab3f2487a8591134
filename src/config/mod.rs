mod settings;

pub use settings::{
    AuthConfig, DatabaseConfig, JwtConfig, ServerConfig, Settings, WebSocketConfig,
};
