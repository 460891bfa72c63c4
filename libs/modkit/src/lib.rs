//! # ModKit - Module Registry
//!
//! Discovers installable modules and themes from package manifests, caches
//! the discovery, tracks which modules are enabled and tells the host
//! application what to register, in dependency order.
//!
//! ## Features
//!
//! - **Discovery**: package manifests (`composer.json` layout) under
//!   configured search paths, glob patterns allowed
//! - **Cache**: one JSON artifact, restored on boot instead of rescanning
//! - **State**: a line-delimited disabled list, safe across processes
//! - **Resolution**: module by name, namespace or filesystem path, longest
//!   prefix wins
//! - **Ordering**: modules follow the modules they require
//!
//! ## Example
//!
//! ```rust,ignore
//! use modkit::{ManagerOptions, ModuleManager, NoConfig};
//!
//! let manager = ModuleManager::boot(ManagerOptions::new("/srv/app"))?;
//! let registry = manager.registry();
//! let blog = registry.by_namespace("Acme\\Blog\\Http\\PostController")?;
//!
//! manager.disable("shop")?;
//! let plan = manager.registration_plan(None, &NoConfig)?;
//! ```

pub mod assets;
pub mod cache;
pub mod contracts;
pub mod error;
pub mod manager;
pub mod manifest;
pub mod module;
pub mod orderer;
pub mod registration;
pub mod registry;
pub mod repository;
pub mod scanner;
pub mod state;

pub use assets::{AssetPublisher, PublishReport};
pub use cache::{CacheBlob, CacheStore, ModuleRecord};
pub use contracts::{
    ConfigProvider, ManifestProviderInspector, NoConfig, ProviderDescriptor, ProviderInspector,
};
pub use error::{LookupKind, ManifestError, RegistryError, Result};
pub use manager::{ManagerOptions, ModuleManager, ScanSummary};
pub use manifest::{PackageManifest, ProviderDeclaration};
pub use module::{Module, Theme};
pub use orderer::DependencyOrderer;
pub use registration::{ModuleRegistration, RegistrationPlan};
pub use registry::ModuleRegistry;
pub use repository::{Named, Repository};
pub use scanner::{ScanOptions, ScanReport, Scanner};
pub use state::DisabledList;
