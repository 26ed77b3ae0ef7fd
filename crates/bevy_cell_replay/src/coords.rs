//! Coordinate types and spatial constants.
//!
//! Defines the coordinate system for the replayed grid:
//! - [`GridPos`]: 0-indexed cell position (the identity of a cell)
//! - [`GridRect`]: axis-aligned rectangle of cells, half-open on both axes
//!
//! The wire format is 1-indexed; conversion happens once, on ingest.

/// Default edge length of a chunk, in cells.
pub const DEFAULT_QUANTUM: i32 = 50;

/// Position of a cell in the grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridPos {
  pub x: i32,
  pub y: i32,
}

impl GridPos {
  /// Creates a new grid position.
  pub const fn new(x: i32, y: i32) -> Self {
    Self { x, y }
  }

  /// Converts a 1-indexed wire coordinate pair into a grid position.
  ///
  /// Saturates at `i32::MIN`; such positions are out of every grid.
  pub const fn from_one_based(x: i32, y: i32) -> Self {
    Self::new(x.saturating_sub(1), y.saturating_sub(1))
  }
}

/// Axis-aligned rectangle of cells.
///
/// Covers `x..x + width` and `y..y + height`. A rectangle with zero width or
/// height is empty and contains nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GridRect {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

impl GridRect {
  /// The canonical empty rectangle.
  pub const EMPTY: GridRect = GridRect::new(0, 0, 0, 0);

  /// Creates a new rectangle. Negative sizes are clamped to zero.
  pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
    Self {
      x,
      y,
      width: if width > 0 { width } else { 0 },
      height: if height > 0 { height } else { 0 },
    }
  }

  /// Creates a rectangle from its min (inclusive) and max (exclusive) corners.
  pub const fn from_corners(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
    Self::new(x0, y0, x1 - x0, y1 - y0)
  }

  /// Creates a rectangle anchored at the origin with the given size.
  pub const fn sized(width: i32, height: i32) -> Self {
    Self::new(0, 0, width, height)
  }

  #[inline]
  pub const fn left(&self) -> i32 {
    self.x
  }

  /// Exclusive right edge.
  #[inline]
  pub const fn right(&self) -> i32 {
    self.x + self.width
  }

  #[inline]
  pub const fn bottom(&self) -> i32 {
    self.y
  }

  /// Exclusive top edge.
  #[inline]
  pub const fn top(&self) -> i32 {
    self.y + self.height
  }

  /// Returns the min corner.
  #[inline]
  pub const fn origin(&self) -> GridPos {
    GridPos::new(self.x, self.y)
  }

  /// Returns true if the rectangle covers no cells.
  #[inline]
  pub const fn is_empty(&self) -> bool {
    self.width <= 0 || self.height <= 0
  }

  /// Number of cells covered.
  pub const fn area(&self) -> i64 {
    if self.is_empty() {
      0
    } else {
      self.width as i64 * self.height as i64
    }
  }

  /// Returns true if the given position is within this rect.
  pub const fn contains(&self, pos: GridPos) -> bool {
    pos.x >= self.left() && pos.x < self.right() && pos.y >= self.bottom() && pos.y < self.top()
  }

  /// Returns true if `inner` lies entirely within this rect.
  ///
  /// An empty `inner` is contained by any rectangle.
  pub const fn contains_rect(&self, inner: &GridRect) -> bool {
    if inner.is_empty() {
      return true;
    }
    inner.left() >= self.left()
      && inner.right() <= self.right()
      && inner.bottom() >= self.bottom()
      && inner.top() <= self.top()
  }

  /// Returns the intersection with `bound`, or [`GridRect::EMPTY`] when the
  /// rectangles don't overlap.
  pub fn clip(&self, bound: &GridRect) -> GridRect {
    let x0 = self.left().max(bound.left());
    let y0 = self.bottom().max(bound.bottom());
    let x1 = self.right().min(bound.right());
    let y1 = self.top().min(bound.top());

    if x0 < x1 && y0 < y1 {
      GridRect::from_corners(x0, y0, x1, y1)
    } else {
      GridRect::EMPTY
    }
  }

  /// Returns true if the two rectangles share at least one cell.
  pub fn overlaps(&self, other: &GridRect) -> bool {
    !self.clip(other).is_empty()
  }

  /// Iterates every cell position in row-major order.
  pub fn positions(&self) -> impl Iterator<Item = GridPos> + use<> {
    let (x0, x1) = (self.left(), self.right());
    let (y0, y1) = (self.bottom(), self.top());
    (y0..y1).flat_map(move |y| (x0..x1).map(move |x| GridPos::new(x, y)))
  }
}
