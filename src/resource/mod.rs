//! Tenant-scoped resource trees: paths, storage operations, link resolution
//! and subtree transfer.

pub mod error;
pub mod links;
pub mod path;
pub mod store;
pub mod transfer;
pub mod types;

pub use error::ResourceError;
pub use path::{NodePath, PathError};
pub use store::ResourceStore;
pub use transfer::{paste, PasteMode, PasteRequest, PasteResult};
pub use types::{
    Link, LinkDepth, LinkPayload, Node, NodeId, NodePayload, ResolvedLink, ResourceFilter,
    TenantId,
};
