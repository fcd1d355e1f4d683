use super::EntityMetadata;

/// Root of an aggregate: identity, lifecycle metadata and the display
/// name used in error messages.
pub trait AggregateRoot {
    type Id;

    fn id(&self) -> Self::Id;

    fn metadata(&self) -> &EntityMetadata;

    fn metadata_mut(&mut self) -> &mut EntityMetadata;

    /// Singular display name, e.g. "Product"
    fn element_name() -> &'static str;

    /// Stamp `updated_at` and bump the optimistic-lock version
    fn before_write(&mut self) {
        let metadata = self.metadata_mut();
        metadata.touch();
        metadata.increment_version();
    }
}
