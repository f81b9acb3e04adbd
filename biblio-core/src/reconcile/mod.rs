//! Source-priority metadata reconciler.
//!
//! Two pure functions decide whether an incoming value may overwrite a
//! stored one. Neither touches the database or the filesystem — both take
//! plain values and return a `bool`, which keeps them trivially testable and
//! safe to call from inside a transaction without worrying about ordering.

use biblio_model::DataSource;

/// Decides whether `new_value` should replace `existing_value` for a scalar
/// field tagged `new_source` / `existing_source`.
///
/// `force_refresh` bypasses the priority comparison but never lets an empty
/// incoming value clear a field — "no information" can't overwrite anything,
/// manual or not.
pub fn should_replace_scalar(
    new_value: &str,
    existing_value: &str,
    new_source: DataSource,
    existing_source: DataSource,
    force_refresh: bool,
) -> bool {
    if force_refresh {
        return !new_value.is_empty();
    }

    let new_priority = new_source.priority();
    let existing_priority = existing_source.priority();

    match new_priority.cmp(&existing_priority) {
        std::cmp::Ordering::Less => !new_value.is_empty(),
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => !new_value.is_empty() && new_value != existing_value,
    }
}

/// Same rule, generalized to relationship sets. `T` must support equality
/// comparison that is sensitive to order where order matters (author and
/// series lists carry `sort_order`; callers pass already-ordered slices).
pub fn should_replace_relationship<T: PartialEq>(
    new_items: &[T],
    existing_items: &[T],
    new_source: DataSource,
    existing_source: DataSource,
    force_refresh: bool,
) -> bool {
    if force_refresh {
        return !new_items.is_empty();
    }

    let new_priority = new_source.priority();
    let existing_priority = existing_source.priority();

    match new_priority.cmp(&existing_priority) {
        std::cmp::Ordering::Less => !new_items.is_empty(),
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => !new_items.is_empty() && new_items != existing_items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biblio_model::DataSource::*;

    #[test]
    fn stronger_source_wins_when_nonempty() {
        assert!(should_replace_scalar("X", "Y", EpubMetadata, Sidecar, false));
    }

    #[test]
    fn stronger_source_with_empty_value_never_wins() {
        assert!(!should_replace_scalar("", "Y", Manual, Sidecar, false));
    }

    #[test]
    fn weaker_source_never_wins() {
        assert!(!should_replace_scalar("X", "Y", Filepath, Sidecar, false));
        assert!(!should_replace_scalar("X", "Y", Sidecar, Manual, false));
    }

    #[test]
    fn equal_priority_requires_strict_change() {
        assert!(should_replace_scalar("X", "Y", EpubMetadata, CbzMetadata, false));
        assert!(!should_replace_scalar("X", "X", EpubMetadata, CbzMetadata, false));
        assert!(!should_replace_scalar("", "Y", EpubMetadata, CbzMetadata, false));
    }

    #[test]
    fn force_refresh_bypasses_priority_but_not_emptiness() {
        assert!(should_replace_scalar("X", "Z", EpubMetadata, Manual, true));
        assert!(!should_replace_scalar("", "Z", EpubMetadata, Manual, true));
    }

    #[test]
    fn manual_is_never_overwritten_without_force() {
        assert!(!should_replace_scalar("X", "Z", EpubMetadata, Manual, false));
        assert!(!should_replace_scalar("X", "Z", Sidecar, Manual, false));
        assert!(!should_replace_scalar("X", "Z", Filepath, Manual, false));
    }

    #[test]
    fn relationship_equal_priority_requires_strict_change() {
        let a = vec![1, 2, 3];
        let b = vec![1, 2, 3];
        let c = vec![3, 2, 1];
        assert!(!should_replace_relationship(&a, &b, EpubMetadata, CbzMetadata, false));
        assert!(should_replace_relationship(&c, &b, EpubMetadata, CbzMetadata, false));
    }

    #[test]
    fn relationship_empty_never_overwrites() {
        let empty: Vec<i32> = vec![];
        let existing = vec![1];
        assert!(!should_replace_relationship(&empty, &existing, Manual, Sidecar, true));
    }
}
