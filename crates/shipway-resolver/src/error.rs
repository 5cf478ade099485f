use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("dependency cycle detected involving: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),
}
