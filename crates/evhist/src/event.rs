//! Events and event sources.
//!
//! - [`Event`] - A single weighted 3D sample
//! - [`EventSource`] - What [`Histogram3D::add_events`](crate::Histogram3D::add_events) consumes
//! - [`EventList`] - Column-oriented event storage, also produced by
//!   [`Histogram3D::get_event_lists`](crate::Histogram3D::get_event_lists)

/// Event list construction errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EventListError {
    #[error("number of {field} ({got}) does not match number of events ({expected})")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        got: usize,
    },
}

// =============================================================================
// Event
// =============================================================================

/// A weighted 3D sample.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub position: [f32; 3],
    pub weight: f32,
}

impl Event {
    /// An event with unit weight.
    #[inline]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self::weighted(x, y, z, 1.0)
    }

    #[inline]
    pub fn weighted(x: f32, y: f32, z: f32, weight: f32) -> Self {
        Self {
            position: [x, y, z],
            weight,
        }
    }
}

/// Axis-aligned bounds of a set of events.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extent {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Extent {
    fn of_point(p: [f32; 3]) -> Self {
        Self { min: p, max: p }
    }

    fn include(&mut self, p: [f32; 3]) {
        for k in 0..3 {
            self.min[k] = self.min[k].min(p[k]);
            self.max[k] = self.max[k].max(p[k]);
        }
    }
}

// =============================================================================
// EventSource
// =============================================================================

/// A finite, randomly accessible collection of events.
///
/// Implementations must be `Sync`: every segment worker reads the whole source.
pub trait EventSource: Sync {
    /// Number of events.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of event `i`.
    fn position(&self, i: usize) -> [f32; 3];

    /// Weight of event `i`. Default: 1.
    fn weight(&self, _i: usize) -> f32 {
        1.0
    }

    /// Per-axis bounds of all positions, or `None` for an empty source.
    fn extent(&self) -> Option<Extent> {
        if self.is_empty() {
            return None;
        }
        let mut extent = Extent::of_point(self.position(0));
        for i in 1..self.len() {
            extent.include(self.position(i));
        }
        Some(extent)
    }
}

impl EventSource for [Event] {
    #[inline]
    fn len(&self) -> usize {
        <[Event]>::len(self)
    }

    #[inline]
    fn position(&self, i: usize) -> [f32; 3] {
        self[i].position
    }

    #[inline]
    fn weight(&self, i: usize) -> f32 {
        self[i].weight
    }
}

impl EventSource for Vec<Event> {
    #[inline]
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    #[inline]
    fn position(&self, i: usize) -> [f32; 3] {
        self[i].position
    }

    #[inline]
    fn weight(&self, i: usize) -> f32 {
        self[i].weight
    }
}

// =============================================================================
// EventList
// =============================================================================

/// Column-oriented events with optional weights and integer codes.
///
/// Missing weights mean unit weight. Codes tag events with a category, for
/// example the level bucket assigned by
/// [`Histogram3D::get_event_lists`](crate::Histogram3D::get_event_lists).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventList {
    positions: Vec<[f32; 3]>,
    weights: Option<Vec<f32>>,
    codes: Option<Vec<u32>>,
}

impl EventList {
    /// Unit-weight events at `positions`.
    pub fn new(positions: Vec<[f32; 3]>) -> Self {
        Self {
            positions,
            weights: None,
            codes: None,
        }
    }

    /// Weighted events.
    pub fn with_weights(
        positions: Vec<[f32; 3]>,
        weights: Vec<f32>,
    ) -> Result<Self, EventListError> {
        if weights.len() != positions.len() {
            return Err(EventListError::LengthMismatch {
                field: "weights",
                expected: positions.len(),
                got: weights.len(),
            });
        }
        Ok(Self {
            positions,
            weights: Some(weights),
            codes: None,
        })
    }

    /// Attach one code per event.
    pub fn with_codes(mut self, codes: Vec<u32>) -> Result<Self, EventListError> {
        if codes.len() != self.positions.len() {
            return Err(EventListError::LengthMismatch {
                field: "codes",
                expected: self.positions.len(),
                got: codes.len(),
            });
        }
        self.codes = Some(codes);
        Ok(self)
    }

    /// Events at `positions` with `weights`, all tagged with `code`.
    pub(crate) fn coded(positions: Vec<[f32; 3]>, weights: Vec<f32>, code: u32) -> Self {
        debug_assert_eq!(positions.len(), weights.len());
        let codes = vec![code; positions.len()];
        Self {
            positions,
            weights: Some(weights),
            codes: Some(codes),
        }
    }

    #[inline]
    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    #[inline]
    pub fn weights(&self) -> Option<&[f32]> {
        self.weights.as_deref()
    }

    #[inline]
    pub fn codes(&self) -> Option<&[u32]> {
        self.codes.as_deref()
    }

    /// Code of event `i`, if codes are present.
    #[inline]
    pub fn code(&self, i: usize) -> Option<u32> {
        self.codes.as_ref().map(|c| c[i])
    }

    /// Sum of all weights.
    pub fn total_weight(&self) -> f64 {
        match &self.weights {
            Some(w) => w.iter().map(|&v| v as f64).sum(),
            None => self.positions.len() as f64,
        }
    }

    /// Iterate events as [`Event`] values.
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        (0..self.positions.len()).map(|i| Event {
            position: self.positions[i],
            weight: EventSource::weight(self, i),
        })
    }

    /// Concatenate lists into one. Weights and codes are kept only if every
    /// input has them.
    pub fn concat<I: IntoIterator<Item = EventList>>(lists: I) -> Self {
        let lists: Vec<EventList> = lists.into_iter().collect();
        let all_weighted = lists.iter().all(|l| l.weights.is_some());
        let all_coded = lists.iter().all(|l| l.codes.is_some());

        let mut out = EventList::default();
        let n: usize = lists.iter().map(|l| l.positions.len()).sum();
        out.positions.reserve(n);
        let mut weights = all_weighted.then(|| Vec::with_capacity(n));
        let mut codes = all_coded.then(|| Vec::with_capacity(n));

        for list in lists {
            if let (Some(dst), Some(src)) = (weights.as_mut(), list.weights) {
                dst.extend(src);
            }
            if let (Some(dst), Some(src)) = (codes.as_mut(), list.codes) {
                dst.extend(src);
            }
            out.positions.extend(list.positions);
        }
        out.weights = weights;
        out.codes = codes;
        out
    }
}

impl EventSource for EventList {
    #[inline]
    fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    fn position(&self, i: usize) -> [f32; 3] {
        self.positions[i]
    }

    #[inline]
    fn weight(&self, i: usize) -> f32 {
        self.weights.as_ref().map_or(1.0, |w| w[i])
    }
}

impl FromIterator<Event> for EventList {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        let (positions, weights) = iter.into_iter().map(|e| (e.position, e.weight)).unzip();
        Self {
            positions,
            weights: Some(weights),
            codes: None,
        }
    }
}

/// Merge the per-segment, per-level output of
/// [`Histogram3D::get_event_lists`](crate::Histogram3D::get_event_lists)
/// into a single list.
pub fn flatten_event_lists(nested: Vec<Vec<Option<EventList>>>) -> EventList {
    EventList::concat(nested.into_iter().flatten().flatten())
}
