//! Object classification and declared ranges.

use serde::{Deserialize, Serialize};

/// Closed set of object kinds every adapter classifies its native objects
/// into. A native kind outside this set is reported as unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectKind {
    /// A hierarchy scope: module instance, entity/architecture, generate
    /// block, interface or program.
    Module,
    /// A net (wire) or VHDL signal of a logic type.
    Net,
    /// A variable of a logic type.
    Register,
    /// An unpacked array of signals or scopes.
    Array,
    Enum,
    /// Struct/record.
    Struct,
    Real,
    Integer,
    String,
    /// Generate-loop container; may be a pseudo-region.
    GenArray,
    /// Package scope.
    Package,
}

impl ObjectKind {
    /// Whether objects of this kind carry a value.
    pub fn is_signal(&self) -> bool {
        matches!(
            self,
            Self::Net | Self::Register | Self::Enum | Self::Real | Self::Integer | Self::String
        )
    }

    /// Whether children are looked up by name below objects of this kind.
    pub fn is_scope(&self) -> bool {
        matches!(self, Self::Module | Self::GenArray | Self::Package | Self::Struct)
    }

    /// Stable numeric code used across the C boundary.
    pub fn code(&self) -> i32 {
        match self {
            Self::Module => 2,
            Self::Net => 3,
            Self::Register => 4,
            Self::Array => 5,
            Self::Enum => 6,
            Self::Struct => 7,
            Self::Real => 8,
            Self::Integer => 9,
            Self::String => 10,
            Self::GenArray => 11,
            Self::Package => 12,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Module => "module",
            Self::Net => "net",
            Self::Register => "register",
            Self::Array => "array",
            Self::Enum => "enum",
            Self::Struct => "struct",
            Self::Real => "real",
            Self::Integer => "integer",
            Self::String => "string",
            Self::GenArray => "generate-array",
            Self::Package => "package",
        };
        write!(f, "{s}")
    }
}

/// Direction of a declared range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeDirection {
    /// `[0:7]`, `0 to 7`.
    Ascending,
    /// `[7:0]`, `7 downto 0`.
    Descending,
}

impl RangeDirection {
    pub fn code(&self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// Declared index range of an indexable object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub left: i64,
    pub right: i64,
    pub direction: RangeDirection,
}

impl Range {
    /// Range whose direction follows from its bounds; a single-element
    /// range counts as descending.
    pub fn from_bounds(left: i64, right: i64) -> Self {
        let direction = if left < right {
            RangeDirection::Ascending
        } else {
            RangeDirection::Descending
        };
        Self {
            left,
            right,
            direction,
        }
    }

    /// Range with an explicitly declared direction. Null ranges (bounds
    /// running against the direction) are kept as declared.
    pub fn with_direction(left: i64, right: i64, direction: RangeDirection) -> Self {
        Self {
            left,
            right,
            direction,
        }
    }

    /// Number of elements; zero for a null range.
    pub fn len(&self) -> usize {
        let span = match self.direction {
            RangeDirection::Ascending => self.right - self.left,
            RangeDirection::Descending => self.left - self.right,
        };
        usize::try_from(span + 1).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `index` lies inside the range.
    pub fn contains(&self, index: i64) -> bool {
        let (lo, hi) = match self.direction {
            RangeDirection::Ascending => (self.left, self.right),
            RangeDirection::Descending => (self.right, self.left),
        };
        (lo..=hi).contains(&index)
    }

    /// Position of `index` counted from the left bound.
    pub fn offset_of(&self, index: i64) -> Option<usize> {
        if !self.contains(index) {
            return None;
        }
        let offset = match self.direction {
            RangeDirection::Ascending => index - self.left,
            RangeDirection::Descending => self.left - index,
        };
        usize::try_from(offset).ok()
    }
}
