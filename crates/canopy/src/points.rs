//! Shared local-frame point storage.

/// Parallel east/north coordinate arrays in local units (centimetres by default).
///
/// Both arrays always have the same length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointSet {
    xs: Vec<i32>,
    ys: Vec<i32>,
}

impl PointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            xs: Vec::with_capacity(n),
            ys: Vec::with_capacity(n),
        }
    }

    /// Build from parallel arrays; `None` when the lengths differ.
    pub fn from_parts(xs: Vec<i32>, ys: Vec<i32>) -> Option<Self> {
        (xs.len() == ys.len()).then_some(Self { xs, ys })
    }

    #[inline]
    pub fn push(&mut self, x: i32, y: i32) {
        self.xs.push(x);
        self.ys.push(y);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    #[inline]
    pub fn xs(&self) -> &[i32] {
        &self.xs
    }

    #[inline]
    pub fn ys(&self) -> &[i32] {
        &self.ys
    }

    #[inline]
    pub fn get(&self, i: usize) -> (i32, i32) {
        (self.xs[i], self.ys[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.xs.iter().copied().zip(self.ys.iter().copied())
    }

    /// Append all points of `other`.
    pub fn extend_from(&mut self, other: &PointSet) {
        self.xs.extend_from_slice(&other.xs);
        self.ys.extend_from_slice(&other.ys);
    }

    pub fn into_parts(self) -> (Vec<i32>, Vec<i32>) {
        (self.xs, self.ys)
    }
}

impl FromIterator<(i32, i32)> for PointSet {
    fn from_iter<I: IntoIterator<Item = (i32, i32)>>(iter: I) -> Self {
        let mut set = PointSet::new();
        for (x, y) in iter {
            set.push(x, y);
        }
        set
    }
}
