use crate::backend::BackendCapabilities;
use crate::types::Uniform;

/// Byte alignment of every uniform's storage range.
pub const UNIFORM_ALIGNMENT: usize = 16;

/// How scalars are represented in uniform storage. Chosen once per runtime
/// from the backend capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UniformLayout {
    /// Lanes hold the declared type: IEEE floats, two's complement ints,
    /// unsigned ints and 0/1 booleans.
    #[default]
    Native,
    /// Every lane holds an IEEE float regardless of the declared type.
    FloatOnly,
}

impl From<BackendCapabilities> for UniformLayout {
    fn from(caps: BackendCapabilities) -> Self {
        if caps.float_only_uniforms {
            Self::FloatOnly
        } else {
            Self::Native
        }
    }
}

/// Contiguous backing store for every active uniform, kept as 32-bit lanes
/// so typed views never need unaligned reads.
#[derive(Debug, Clone, Default)]
pub struct UniformStorage {
    lanes: Vec<u32>,
    layout: UniformLayout,
}

impl UniformStorage {
    pub fn new(layout: UniformLayout) -> Self {
        Self {
            lanes: Vec::new(),
            layout,
        }
    }

    pub fn layout(&self) -> UniformLayout {
        self.layout
    }

    /// Reserves a zeroed, aligned range of `size` bytes and returns its
    /// offset.
    pub fn allocate(&mut self, size: usize) -> usize {
        let offset = self.len().next_multiple_of(UNIFORM_ALIGNMENT);
        let end = offset + size.next_multiple_of(4);
        self.lanes.resize(end / 4, 0);
        offset
    }

    pub fn clear(&mut self) {
        self.lanes.clear();
    }

    /// Capacity in bytes.
    pub fn len(&self) -> usize {
        self.lanes.len() * 4
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.lanes)
    }

    /// Lanes backing `uniform`, truncated at the end of storage.
    pub(crate) fn lanes(&self, uniform: &Uniform) -> &[u32] {
        let (start, end) = self.range(uniform);
        &self.lanes[start..end]
    }

    pub(crate) fn lanes_mut(&mut self, uniform: &Uniform) -> &mut [u32] {
        let (start, end) = self.range(uniform);
        &mut self.lanes[start..end]
    }

    fn range(&self, uniform: &Uniform) -> (usize, usize) {
        let start = (uniform.offset() / 4).min(self.lanes.len());
        let end = (start + uniform.ty().components()).min(self.lanes.len());
        (start, end)
    }
}
