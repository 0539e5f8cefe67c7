use rand::prelude::*;

use crate::event::{Event, EventList};

/// Generate events uniformly inside the box `[min, max)`.
///
/// Weights are multiples of 0.25 in `[0.25, 2]`, so sums of a few million of
/// them are exact in `f32` and independent of accumulation order.
pub fn random_events(n: usize, seed: u64, min: [f32; 3], max: [f32; 3]) -> Vec<Event> {
    assert!((0..3).all(|k| max[k] > min[k]));
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let mut position = [0.0f32; 3];
            for k in 0..3 {
                position[k] = rng.gen_range(min[k]..max[k]);
            }
            let weight = rng.gen_range(1..=8u8) as f32 * 0.25;
            Event { position, weight }
        })
        .collect()
}

/// Same as [`random_events`], collected into an [`EventList`].
pub fn random_event_list(n: usize, seed: u64, min: [f32; 3], max: [f32; 3]) -> EventList {
    random_events(n, seed, min, max).into_iter().collect()
}

/// Unit-weight events scattered around `center` with per-axis spread `sigma`.
///
/// Offsets are the sum of three uniform draws, a cheap bell shape.
pub fn blob_events(n: usize, seed: u64, center: [f32; 3], sigma: f32) -> Vec<Event> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut offset = || (0..3).map(|_| rng.gen_range(-1.0f32..1.0)).sum::<f32>() * sigma;
    (0..n)
        .map(|_| {
            Event::new(
                center[0] + offset(),
                center[1] + offset(),
                center[2] + offset(),
            )
        })
        .collect()
}
