mod apply;
mod error;
mod revert;
mod types;

pub use apply::resolve_apply;
pub use error::ResolveError;
pub use revert::resolve_revert;
pub use types::{ApplyResolution, BlockedRevert, PatchNode, RevertResolution, SkippedApply};

#[cfg(test)]
mod tests;
