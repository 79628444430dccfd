//! Background Services Module
//!
//! Provides the loader's background services for cache maintenance and
//! speculative warming, plus the framework that manages their lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────┐
//! │ Service Manager │────▶│  Sweeper Service │────▶│  TTL Cache  │
//! └─────────────────┘     └──────────────────┘     └─────────────┘
//!         │                                               ▲
//!         ▼                                               │
//! ┌─────────────────┐     ┌──────────────────┐            │
//! │ Shutdown Signal │◀────│ Preload Service  │────────────┘
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! # Services
//!
//! - **ServiceManager**: Coordinates lifecycle of all background services
//! - **SweeperService**: Expires cache entries on a fixed interval
//! - **PreloadService**: Warms the cache from fired interaction signals
//!
//! # Example
//!
//! ```rust,ignore
//! use prewarm::services::{ServiceManager, ServiceConfig};
//!
//! let manager = ServiceManager::new(ServiceConfig::default());
//! manager.register(sweeper);
//!
//! // Start all services
//! manager.start_all().await?;
//!
//! // Graceful shutdown
//! manager.shutdown().await?;
//! ```

pub mod framework;
pub mod preloader;
pub mod sweeper;

pub use framework::{
    RestartPolicy, Service, ServiceConfig, ServiceError, ServiceManager, ServiceStatus,
    SharedServiceManager,
};
pub use preloader::{PreloadConfig, PreloadService};
pub use sweeper::{SweeperConfig, SweeperService};
