/// Generation-checked index into the graph's resource table.
///
/// A handle only resolves while its generation matches the slot it points at.
/// Every [`RenderGraph::reset`](crate::RenderGraph::reset) bumps the slot
/// generations, so handles kept across frames are rejected instead of
/// silently aliasing a newer resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    index: u32,
    generation: u32,
}

impl ResourceHandle {
    pub const INVALID: Self = Self {
        index: u32::MAX,
        generation: 0,
    };

    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    pub fn is_valid(self) -> bool {
        self.index != u32::MAX
    }

    pub(crate) fn slot(self) -> usize {
        self.index as usize
    }
}

impl Default for ResourceHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Index of a pass in the graph's pass table.
///
/// Passes are never recycled within a frame, so there is no generation. A
/// `PassHandle` must not be used after the frame it was created in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassHandle {
    index: u32,
}

impl PassHandle {
    pub const INVALID: Self = Self { index: u32::MAX };

    pub(crate) fn new(index: u32) -> Self {
        Self { index }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn is_valid(self) -> bool {
        self.index != u32::MAX
    }

    pub(crate) fn slot(self) -> usize {
        self.index as usize
    }
}

impl Default for PassHandle {
    fn default() -> Self {
        Self::INVALID
    }
}
