pub mod entity_cache;
pub mod proxy_cache;

pub use entity_cache::EntityCache;
pub use proxy_cache::ProxyCache;
