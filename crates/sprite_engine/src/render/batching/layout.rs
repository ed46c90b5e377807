//! Vertex attribute layout descriptors
//!
//! A batch describes its per-vertex data as an ordered attribute list. The
//! order is load-bearing twice over: it fixes the byte layout of the staging
//! buffer, and it fixes the attribute binding indices (0..N in array order),
//! which must line up with the declaration order in the vertex shader source.

/// Component type of a vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    /// 32-bit float components
    F32,
    /// Unsigned byte components (packed colors)
    U8,
}

impl AttributeType {
    /// Size of one component in bytes
    #[must_use]
    pub const fn byte_size(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::U8 => 1,
        }
    }
}

/// One attribute of a vertex layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Attribute name; must match the vertex shader declaration
    pub name: &'static str,
    /// Number of components
    pub component_count: u32,
    /// Component type
    pub component_type: AttributeType,
    /// Whether integer components are normalized to [0, 1]
    pub normalized: bool,
}

impl VertexAttribute {
    /// Float attribute with the given component count
    #[must_use]
    pub const fn float(name: &'static str, component_count: u32) -> Self {
        Self {
            name,
            component_count,
            component_type: AttributeType::F32,
            normalized: false,
        }
    }

    /// Normalized unsigned-byte attribute with the given component count
    #[must_use]
    pub const fn normalized_u8(name: &'static str, component_count: u32) -> Self {
        Self {
            name,
            component_count,
            component_type: AttributeType::U8,
            normalized: true,
        }
    }

    /// Byte span of this attribute within a vertex
    #[must_use]
    pub const fn byte_span(&self) -> usize {
        self.component_count as usize * self.component_type.byte_size()
    }
}

/// Byte stride of one vertex under this layout
#[must_use]
pub fn vertex_byte_stride(attributes: &[VertexAttribute]) -> usize {
    attributes.iter().map(VertexAttribute::byte_span).sum()
}

/// Number of f32 slots one vertex occupies in the staging buffer.
///
/// Every attribute span is a multiple of four bytes (floats, or four packed
/// bytes), so the staging buffer can stay a flat f32 array.
#[must_use]
pub fn floats_per_vertex(attributes: &[VertexAttribute]) -> usize {
    let stride = vertex_byte_stride(attributes);
    debug_assert!(
        attributes.iter().all(|a| a.byte_span() % 4 == 0),
        "attribute spans must be 4-byte aligned"
    );
    stride / 4
}
