use crate::handle::ResourceHandle;

#[derive(Debug, thiserror::Error)]
pub enum RenderGraphError {
    #[error("Pass '{pass}' references stale resource handle {handle:?}")]
    StaleResourceHandle { pass: String, handle: ResourceHandle },

    #[error("Pass '{pass}' uses {actual} resource '{resource}' where a {expected} is required")]
    ResourceKindMismatch {
        pass: String,
        resource: String,
        expected: String,
        actual: String,
    },

    #[error("Pass '{pass}' callback does not match its declaration: {reason}")]
    CallbackTypeMismatch { pass: String, reason: String },

    #[error("Pass '{pass}' has no execute callback")]
    MissingCallback { pass: String },

    #[error("Render graph contains cycles between passes {passes:?}")]
    CyclicDependency { passes: Vec<String> },

    #[error("Failed to allocate transient resource '{resource}'")]
    AllocationFailed {
        resource: String,
        #[source]
        source: DeviceError,
    },

    #[error("Failed to begin render pass '{pass}'")]
    RenderPassFailed {
        pass: String,
        #[source]
        source: DeviceError,
    },

    #[error("Resource '{resource}' (handle: {handle:?}) not bound")]
    ResourceNotBound {
        resource: String,
        handle: ResourceHandle,
    },

    #[error("Type mismatch: {operation} called on {actual_type} resource '{resource}'")]
    TypeMismatch {
        operation: String,
        actual_type: String,
        resource: String,
    },
}

pub type Result<T> = std::result::Result<T, RenderGraphError>;

/// Failure reported by a [`RenderDevice`](crate::RenderDevice) when creating GPU objects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("Invalid descriptor for '{label}': {reason}")]
    InvalidDescriptor { label: String, reason: String },

    #[error("Out of memory while creating '{label}'")]
    OutOfMemory { label: String },

    #[error("Backend error for '{label}': {message}")]
    Backend { label: String, message: String },
}
