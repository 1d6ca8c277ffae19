use serde::{Deserialize, Serialize};

/// A numeric range that generates register values on the fly.
///
/// `end` is inclusive. Values above 255 wrap to their low 8 bits when written, the same
/// narrowing a native `u8` cast performs: `256` is written as `0`, `260` as `4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicRange {
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

impl DynamicRange {
    pub fn new(start: i64, end: i64, step: i64) -> Self {
        Self { start, end, step }
    }

    /// Register values for one pass, in write order.
    pub fn values(&self) -> DynamicValues {
        DynamicValues {
            current: self.start,
            end: self.end,
            step: self.step,
        }
    }

    /// Number of register writes in a single pass.
    pub fn writes_per_pass(&self) -> usize {
        if self.step <= 0 || self.start > self.end {
            return 0;
        }
        ((self.end - self.start) / self.step + 1) as usize
    }
}

/// Iterator over the truncated values of a [`DynamicRange`].
#[derive(Debug, Clone)]
pub struct DynamicValues {
    current: i64,
    end: i64,
    step: i64,
}

impl Iterator for DynamicValues {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.step <= 0 || self.current > self.end {
            return None;
        }
        let value = self.current as u8;
        self.current = self.current.saturating_add(self.step);
        Some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShowPayload {
    /// Explicit register bytes, written in order.
    Static { bytes: Vec<u8> },
    /// Procedurally generated bytes.
    Dynamic { range: DynamicRange },
}

/// One named lighting sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Show {
    pub id: i32,
    pub name: String,
    pub iterations: u32,
    /// Delay after each static byte. Dynamic shows ignore it.
    pub speed_ms: u64,
    pub payload: ShowPayload,
}

impl Show {
    pub fn new_static(
        id: i32,
        name: impl Into<String>,
        iterations: u32,
        speed_ms: u64,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            iterations,
            speed_ms,
            payload: ShowPayload::Static { bytes },
        }
    }

    pub fn new_dynamic(
        id: i32,
        name: impl Into<String>,
        iterations: u32,
        speed_ms: u64,
        range: DynamicRange,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            iterations,
            speed_ms,
            payload: ShowPayload::Dynamic { range },
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.payload, ShowPayload::Dynamic { .. })
    }

    pub fn writes_per_iteration(&self) -> usize {
        match &self.payload {
            ShowPayload::Static { bytes } => bytes.len(),
            ShowPayload::Dynamic { range } => range.writes_per_pass(),
        }
    }

    pub fn total_writes(&self) -> usize {
        self.writes_per_iteration() * self.iterations as usize
    }
}

/// Shows decoded from one document, in document order. Ids are not required to be unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowSet(Vec<Show>);

impl ShowSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, show: Show) {
        self.0.push(show);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Show> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total_writes(&self) -> usize {
        self.0.iter().map(Show::total_writes).sum()
    }
}

impl From<Vec<Show>> for ShowSet {
    fn from(shows: Vec<Show>) -> Self {
        Self(shows)
    }
}

impl IntoIterator for ShowSet {
    type Item = Show;
    type IntoIter = std::vec::IntoIter<Show>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ShowSet {
    type Item = &'a Show;
    type IntoIter = std::slice::Iter<'a, Show>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
