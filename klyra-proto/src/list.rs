//! Ordered list primitive shared by columns and tasks.
//!
//! Both operations consume the list and hand back a new one, so callers
//! keep the previous value around when they need a snapshot. Positions are
//! the only source of truth for ordering: after any edit, [`resequence`]
//! rewrites every element's `order` from its index.

/// Errors that can occur when editing an ordered list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListError {
    /// The index does not address an element of the list.
    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Length of the list at the time of the request.
        len: usize,
    },
}

/// An element that carries a dense, 0-based position within its list.
pub trait Positioned {
    /// Returns the stored position.
    fn order(&self) -> u32;

    /// Overwrites the stored position.
    fn set_order(&mut self, order: u32);
}

/// Removes the element at `index`, returning it along with the remaining list.
///
/// The relative order of the remaining elements is preserved.
///
/// # Errors
///
/// Returns [`ListError::IndexOutOfRange`] if `index` is not in `[0, len)`.
pub fn remove_at<T>(mut list: Vec<T>, index: usize) -> Result<(T, Vec<T>), ListError> {
    if index >= list.len() {
        return Err(ListError::IndexOutOfRange {
            index,
            len: list.len(),
        });
    }
    let item = list.remove(index);
    Ok((item, list))
}

/// Inserts `item` at `index`, clamping the index into `[0, len]`.
///
/// An index at or beyond the current length appends.
#[must_use]
pub fn insert_at<T>(mut list: Vec<T>, index: usize, item: T) -> Vec<T> {
    let index = index.min(list.len());
    list.insert(index, item);
    list
}

/// Rewrites each element's order to match its position in the list.
///
/// Caller-supplied orders are never trusted on a touched list.
#[allow(clippy::cast_possible_truncation)]
pub fn resequence<T: Positioned>(list: &mut [T]) {
    for (position, item) in list.iter_mut().enumerate() {
        // Boards hold far fewer than u32::MAX tasks per column.
        item.set_order(position as u32);
    }
}

/// Returns `true` if the stored orders are exactly `0..len` in sequence.
#[allow(clippy::cast_possible_truncation)]
pub fn is_dense<T: Positioned>(list: &[T]) -> bool {
    list.iter()
        .enumerate()
        .all(|(position, item)| item.order() == position as u32)
}
