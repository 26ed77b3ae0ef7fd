//! Quantized rectangle algebra for viewport paging.
//!
//! All distances are rounded *up* to the chunk quantum so the loaded area
//! never under-covers the visible area, and every edge that moves stays on
//! the chunk lattice.

use crate::coords::GridRect;

/// Rounds a positive distance up to the next multiple of `step`.
#[inline]
pub fn ceil_to_step(distance: i32, step: i32) -> i32 {
  debug_assert!(step > 0, "quantum must be positive");
  if distance <= 0 {
    return 0;
  }
  (distance + step - 1) / step * step
}

/// [`ceil_to_step`] that returns `None` instead of overflowing.
pub fn checked_ceil_to_step(distance: i32, step: i32) -> Option<i32> {
  if step <= 0 {
    return None;
  }
  if distance <= 0 {
    return Some(0);
  }
  distance
    .checked_add(step - 1)
    .map(|d| d / step)?
    .checked_mul(step)
}

/// Collapses an inverted span onto the edge that moved.
///
/// Rounding up can push an edge past its opposite edge; the collapsed span
/// keeps the position the shrink was heading toward.
fn collapse(lo: i32, hi: i32, lo_moved: bool) -> (i32, i32) {
  if hi >= lo {
    (lo, hi)
  } else if lo_moved {
    (lo, lo)
  } else {
    (hi, hi)
  }
}

/// Pulls each edge of `current` inward where `target` lies further inward.
///
/// Edges where `target` extends beyond `current` are left untouched.
pub fn shrink_to_boundary(current: GridRect, target: GridRect, quantum: i32) -> GridRect {
  let (mut x0, mut x1) = (current.left(), current.right());
  let (mut y0, mut y1) = (current.bottom(), current.top());

  let left_moved = x0 < target.left();
  if left_moved {
    x0 += ceil_to_step(target.left() - x0, quantum);
  }
  if x1 > target.right() {
    x1 -= ceil_to_step(x1 - target.right(), quantum);
  }
  let bottom_moved = y0 < target.bottom();
  if bottom_moved {
    y0 += ceil_to_step(target.bottom() - y0, quantum);
  }
  if y1 > target.top() {
    y1 -= ceil_to_step(y1 - target.top(), quantum);
  }

  let (x0, x1) = collapse(x0, x1, left_moved);
  let (y0, y1) = collapse(y0, y1, bottom_moved);
  GridRect::from_corners(x0, y0, x1, y1)
}

/// Pushes each edge of `current` outward until it covers `target`.
pub fn grow_to_boundary(current: GridRect, target: GridRect, quantum: i32) -> GridRect {
  let (mut x0, mut x1) = (current.left(), current.right());
  let (mut y0, mut y1) = (current.bottom(), current.top());

  if x0 > target.left() {
    x0 -= ceil_to_step(x0 - target.left(), quantum);
  }
  if x1 < target.right() {
    x1 += ceil_to_step(target.right() - x1, quantum);
  }
  if y0 > target.bottom() {
    y0 -= ceil_to_step(y0 - target.bottom(), quantum);
  }
  if y1 < target.top() {
    y1 += ceil_to_step(target.top() - y1, quantum);
  }

  GridRect::from_corners(x0, y0, x1, y1)
}

/// Covers `target` minus `covered` with quantum-sized rectangles.
///
/// The bands below and above `covered` span the full target width; the bands
/// left and right of it span only the covered rows. Each band is cut on the
/// quantum lattice anchored at the target origin, so cells at the far edge of
/// the target may produce truncated rectangles.
pub fn split_remainder(target: GridRect, covered: GridRect, quantum: i32) -> Vec<GridRect> {
  let mut out = Vec::new();
  if target.is_empty() {
    return out;
  }

  let covered = covered.clip(&target);
  if covered.is_empty() {
    tile_band(target, target, quantum, &mut out);
    return out;
  }

  let bands = [
    GridRect::from_corners(target.left(), target.bottom(), target.right(), covered.bottom()),
    GridRect::from_corners(target.left(), covered.top(), target.right(), target.top()),
    GridRect::from_corners(target.left(), covered.bottom(), covered.left(), covered.top()),
    GridRect::from_corners(covered.right(), covered.bottom(), target.right(), covered.top()),
  ];
  for band in bands {
    tile_band(band, target, quantum, &mut out);
  }
  out
}

/// Next lattice line strictly after `value`, relative to `anchor`.
#[inline]
fn next_cut(value: i32, anchor: i32, quantum: i32) -> i32 {
  anchor + ((value - anchor).div_euclid(quantum) + 1) * quantum
}

fn tile_band(band: GridRect, lattice: GridRect, quantum: i32, out: &mut Vec<GridRect>) {
  if band.is_empty() {
    return;
  }

  let mut y = band.bottom();
  while y < band.top() {
    let y_next = next_cut(y, lattice.bottom(), quantum).min(band.top());
    let mut x = band.left();
    while x < band.right() {
      let x_next = next_cut(x, lattice.left(), quantum).min(band.right());
      out.push(GridRect::from_corners(x, y, x_next, y_next));
      x = x_next;
    }
    y = y_next;
  }
}
