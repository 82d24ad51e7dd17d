use crate::types::VertexId;

/// A fixed-width, per-vertex scratch buffer for sensory inputs or decided
/// actions.
///
/// For each `VertexId`, this buffer stores:
///
/// - A row of `width` values.
/// - Whether the row was written during the current step.
///
/// Rows live in one flat allocation; row `i` is `values[i * width..(i + 1) * width]`.
/// Only rows marked active are handed to the decision function.
#[derive(Debug, Clone)]
pub struct PolypBuffer {
    width: usize,
    values: Vec<f32>,
    active: Vec<bool>,
}

impl PolypBuffer {
    /// Creates a new [`PolypBuffer`] with `len` rows of `width` values.
    ///
    /// All values start at `0.0` and every row starts inactive.
    ///
    /// ### Parameters
    /// - `len` - Number of vertices this buffer can hold rows for.
    /// - `width` - Number of values per row.
    ///
    /// ### Returns
    /// A new [`PolypBuffer`].
    pub fn with_len(len: usize, width: usize) -> Self {
        Self {
            width,
            values: vec![0.0; len * width],
            active: vec![false; len],
        }
    }

    /// Ensures the buffer holds exactly `len` rows and clears it.
    ///
    /// After this call every row is inactive and zeroed, even if the
    /// length was already correct.
    pub fn ensure_len(&mut self, len: usize) {
        if self.active.len() != len {
            self.values.resize(len * self.width, 0.0);
            self.active.resize(len, false);
        }
        self.clear();
    }

    /// Zeroes all rows and marks them inactive without changing the length.
    pub fn clear(&mut self) {
        self.values.fill(0.0);
        self.active.fill(false);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the row for `id`.
    ///
    /// ### Panics
    /// Panics if `id` is out of bounds.
    #[inline]
    pub fn row(&self, id: VertexId) -> &[f32] {
        &self.values[id * self.width..(id + 1) * self.width]
    }

    /// Returns the row for `id` mutably and marks it active.
    ///
    /// ### Panics
    /// Panics if `id` is out of bounds.
    #[inline]
    pub fn row_mut(&mut self, id: VertexId) -> &mut [f32] {
        self.active[id] = true;
        &mut self.values[id * self.width..(id + 1) * self.width]
    }

    #[inline]
    pub fn is_active(&self, id: VertexId) -> bool {
        self.active[id]
    }

    /// Returns an iterator over all vertex ids whose rows are active, in
    /// ascending order.
    pub fn active_indices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.active
            .iter()
            .enumerate()
            .filter(|(_, a)| **a)
            .map(|(i, _)| i)
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|a| **a).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_len_initializes_zeroed_inactive_rows() {
        let buf = PolypBuffer::with_len(4, 3);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.width(), 3);
        for id in 0..4 {
            assert_eq!(buf.row(id), &[0.0, 0.0, 0.0]);
            assert!(!buf.is_active(id));
        }
        assert_eq!(buf.active_count(), 0);
    }

    #[test]
    fn row_mut_marks_row_active() {
        let mut buf = PolypBuffer::with_len(3, 2);
        buf.row_mut(1).copy_from_slice(&[0.5, -1.0]);

        assert!(buf.is_active(1));
        assert_eq!(buf.row(1), &[0.5, -1.0]);
        assert_eq!(buf.row(0), &[0.0, 0.0]);
        assert_eq!(buf.row(2), &[0.0, 0.0]);
    }

    #[test]
    fn ensure_len_resizes_and_clears() {
        let mut buf = PolypBuffer::with_len(2, 2);
        buf.row_mut(0)[0] = 1.0;

        buf.ensure_len(2);
        assert!(!buf.is_active(0));
        assert_eq!(buf.row(0), &[0.0, 0.0]);

        buf.row_mut(1)[1] = 3.0;
        buf.ensure_len(5);
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.active_count(), 0);
        for id in 0..5 {
            assert_eq!(buf.row(id), &[0.0, 0.0]);
        }

        buf.ensure_len(1);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn active_indices_returns_only_written_rows() {
        let mut buf = PolypBuffer::with_len(5, 1);
        buf.row_mut(0)[0] = 1.0;
        buf.row_mut(3)[0] = 2.0;

        let ids: Vec<VertexId> = buf.active_indices().collect();
        assert_eq!(ids, vec![0, 3]);

        buf.clear();
        assert!(buf.active_indices().next().is_none());
    }

    #[test]
    #[should_panic]
    fn row_out_of_bounds_panics() {
        let buf = PolypBuffer::with_len(2, 2);
        let _ = buf.row(2);
    }
}
