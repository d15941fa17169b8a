//! Pure viewport filtering. Nothing here mutates its input; distances are
//! attached to borrowed items in [`Ranked`] instead.

use rayon::prelude::*;

use crate::{
    config::ZoomCaps,
    shared::{
        Located,
        geo::{Bounds, Coordinate, Distance},
    },
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranked<'a, T> {
    pub item: &'a T,
    pub distance: Distance,
}

/// Items inside `bounds` after inflating each edge by `padding` (a fraction
/// of the span, so 0.3 grows every side by 30%).
pub fn within_bounds<'a, T>(items: &'a [T], bounds: &Bounds, padding: f64) -> Vec<&'a T>
where
    T: Located + Sync,
{
    let padded = bounds.pad(padding);
    items
        .par_iter()
        .filter(|item| padded.contains(&item.coordinate()))
        .collect()
}

/// The `cap(zoom)` items closest to `center`, nearest first.
pub fn nearest_limited<'a, T>(
    items: &[&'a T],
    center: &Coordinate,
    zoom: f64,
    caps: &ZoomCaps,
) -> Vec<Ranked<'a, T>>
where
    T: Located + Sync,
{
    nearest(items, center, caps.max_stops(zoom))
}

/// The `count` items closest to `center`, nearest first.
pub fn nearest<'a, T>(items: &[&'a T], center: &Coordinate, count: usize) -> Vec<Ranked<'a, T>>
where
    T: Located + Sync,
{
    let mut ranked = rank_by_distance(items.par_iter().copied(), center);
    ranked.truncate(count);
    ranked
}

/// What the map should show for a viewport: nearest-first items from the
/// padded bounds, or from the whole set when the bounds hold nothing.
pub fn visible<'a, T>(
    items: &'a [T],
    bounds: &Bounds,
    padding: f64,
    zoom: f64,
    caps: &ZoomCaps,
) -> Vec<Ranked<'a, T>>
where
    T: Located + Sync,
{
    let center = bounds.center();
    let in_bounds = within_bounds(items, bounds, padding);
    let mut ranked = if in_bounds.is_empty() {
        rank_by_distance(items.par_iter(), &center)
    } else {
        rank_by_distance(in_bounds.into_par_iter(), &center)
    };
    ranked.truncate(caps.max_stops(zoom));
    ranked
}

fn rank_by_distance<'a, T, I>(items: I, center: &Coordinate) -> Vec<Ranked<'a, T>>
where
    T: Located + Sync + 'a,
    I: ParallelIterator<Item = &'a T>,
{
    let mut ranked: Vec<Ranked<'a, T>> = items
        .map(|item| Ranked {
            item,
            distance: item.coordinate().distance(center),
        })
        .collect();
    ranked.par_sort_by(|a, b| a.distance.total_cmp(&b.distance));
    ranked
}

#[test]
fn nearest_limited_caps_and_sorts() {
    let center = Coordinate::new(50.0, 20.0);
    let points: Vec<Coordinate> = (0..150)
        .rev()
        .map(|i| Coordinate::new(50.0 + i as f64 * 0.001, 20.0))
        .collect();
    let refs: Vec<&Coordinate> = points.iter().collect();
    let caps = ZoomCaps::default();

    let result = nearest_limited(&refs, &center, 10.0, &caps);
    assert_eq!(result.len(), 40);
    assert_eq!(*result[0].item, center);
    assert!(result.windows(2).all(|w| w[0].distance <= w[1].distance));

    assert_eq!(nearest_limited(&refs, &center, 14.0, &caps).len(), 60);
    assert_eq!(nearest_limited(&refs, &center, 16.0, &caps).len(), 100);
}
