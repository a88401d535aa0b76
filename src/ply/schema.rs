//! Element and property descriptors.
//!
//! The schema is positional: the body stores properties in exactly the
//! order they appear here.

use crate::util::PrimitiveType;

/// A named, typed field of an element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Property {
    /// Property name, unique within its element.
    pub name: String,
    /// Storage type. For lists, the type of each list entry.
    pub ty: PrimitiveType,
    /// Type of the per-instance length prefix; `Invalid` for scalars.
    pub list_type: PrimitiveType,
}

impl Property {
    /// Create a scalar property.
    pub fn scalar(name: impl Into<String>, ty: PrimitiveType) -> Self {
        Self {
            name: name.into(),
            ty,
            list_type: PrimitiveType::Invalid,
        }
    }

    /// Create a list property.
    pub fn list(name: impl Into<String>, list_type: PrimitiveType, ty: PrimitiveType) -> Self {
        Self {
            name: name.into(),
            ty,
            list_type,
        }
    }

    /// Returns true for list properties.
    #[inline]
    pub fn is_list(&self) -> bool {
        self.list_type.is_valid()
    }
}

/// A counted group of properties repeated in the body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Element {
    /// Element name.
    pub name: String,
    /// Number of instances stored in the body.
    pub count: usize,
    /// Properties in declaration order.
    pub properties: Vec<Property>,
}

impl Element {
    /// Create an element with no properties.
    pub fn new(name: impl Into<String>, count: usize) -> Self {
        Self {
            name: name.into(),
            count,
            properties: Vec::new(),
        }
    }

    /// Find a property index by name.
    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    /// Find a property by name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Returns true if any property is a list.
    pub fn has_lists(&self) -> bool {
        self.properties.iter().any(Property::is_list)
    }

    /// Bytes per instance for an element without lists.
    pub fn fixed_stride(&self) -> Option<usize> {
        if self.has_lists() {
            None
        } else {
            Some(self.properties.iter().map(|p| p.ty.num_bytes()).sum())
        }
    }
}

/// Find an element index by name.
pub fn element_index(elements: &[Element], name: &str) -> Option<usize> {
    elements.iter().position(|e| e.name == name)
}
