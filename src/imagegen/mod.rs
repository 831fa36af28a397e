pub mod circuit_breaker;
pub mod config;
pub mod gemini;
pub mod interface;
pub mod monster;
pub mod resilience;
pub mod selector;
pub mod service;
pub mod source;
pub mod stability;

#[cfg(test)]
mod tests;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::{ImageGenProviderConfig, ImageGenSystemConfig};
pub use interface::{
    AspectRatio, ErrorKind, GenerationRequest, ImageGenError, ImageGenProvider, ImageResult,
    ProviderId,
};
pub use resilience::{ProviderGuard, TimeoutGuard};
pub use selector::{
    JsonFilePreferenceStore, MemoryPreferenceStore, PreferenceStore, ProviderSelector,
    SelectorError,
};
pub use service::{ImageGenService, ProviderSet};
