//! Property requests and the sink plan used by the body decoders.
//!
//! Each request claims an ordered subset of one element's properties and
//! owns one output buffer. Before decoding, the requests are folded into a
//! [`SinkPlan`]: for every (element, property) pair, the list of buffers
//! that receive its bytes. An empty list is the discard path.

use smallvec::SmallVec;
use tracing::debug;

use super::data::PlyData;
use super::schema::{element_index, Element};
use crate::util::{Error, Result};

/// Handle to a registered request, used to collect its buffer after decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(usize);

impl RequestId {
    /// Position of the request in registration order.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A registered request and its preallocated buffer.
#[derive(Debug)]
struct Request {
    element: usize,
    /// Property indices in header order.
    properties: Vec<usize>,
    data: PlyData,
}

/// Request registry owned by a file handle.
#[derive(Debug, Default)]
pub(crate) struct RequestRegistry {
    requests: Vec<Request>,
}

impl RequestRegistry {
    /// Validate a request against the schema and allocate its buffer.
    ///
    /// A failed request leaves the registry unchanged.
    pub fn request(
        &mut self,
        elements: &[Element],
        element_name: &str,
        property_names: &[&str],
        list_size_hint: usize,
    ) -> Result<RequestId> {
        let element_idx = element_index(elements, element_name)
            .ok_or_else(|| Error::UnknownElement(element_name.to_string()))?;
        let element = &elements[element_idx];

        if property_names.is_empty() {
            return Err(Error::EmptyRequest(element.name.clone()));
        }

        let mut indices = Vec::with_capacity(property_names.len());
        for &name in property_names {
            let idx = element
                .property_index(name)
                .ok_or_else(|| Error::UnknownProperty {
                    element: element.name.clone(),
                    property: name.to_string(),
                })?;
            if indices.contains(&idx) {
                return Err(Error::DuplicatePropertyName {
                    element: element.name.clone(),
                    property: name.to_string(),
                });
            }
            indices.push(idx);
        }

        // Buffer layout follows the body, not the caller's order
        indices.sort_unstable();

        let first = &element.properties[indices[0]];
        let any_list = indices.iter().any(|&i| element.properties[i].is_list());
        if any_list && indices.len() > 1 {
            return Err(Error::MixedPropertyKinds(element.name.clone()));
        }
        if let Some(other) = indices
            .iter()
            .map(|&i| &element.properties[i])
            .find(|p| p.ty != first.ty)
        {
            return Err(Error::MixedPropertyTypes {
                element: element.name.clone(),
                first: first.ty.to_string(),
                second: other.ty.to_string(),
            });
        }

        let data = if first.is_list() {
            PlyData::list(
                first.name.clone(),
                first.list_type,
                first.ty,
                element.count,
                list_size_hint,
            )
        } else {
            let names = indices
                .iter()
                .map(|&i| element.properties[i].name.clone())
                .collect();
            PlyData::scalar(names, first.ty, element.count)
        };

        debug!(
            element = %element.name,
            properties = ?data.properties,
            ty = %data.ty,
            list = data.is_list(),
            "registered property request"
        );

        let id = RequestId(self.requests.len());
        self.requests.push(Request {
            element: element_idx,
            properties: indices,
            data,
        });
        Ok(id)
    }

    /// Number of registered requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Fold the requests into a per-property sink map.
    pub fn plan(&self, elements: &[Element]) -> SinkPlan {
        let mut sinks: Vec<Vec<Sinks>> = elements
            .iter()
            .map(|e| vec![Sinks::new(); e.properties.len()])
            .collect();
        for (buffer, request) in self.requests.iter().enumerate() {
            for &p in &request.properties {
                sinks[request.element][p].push(buffer);
            }
        }
        SinkPlan { sinks }
    }

    /// Move the buffers out, in request order.
    pub fn take_buffers(&mut self) -> Vec<PlyData> {
        self.requests
            .iter_mut()
            .map(|r| std::mem::take(&mut r.data))
            .collect()
    }
}

/// Buffers claiming one property. Almost always zero or one.
pub(crate) type Sinks = SmallVec<[usize; 2]>;

/// Destination buffers for every (element, property) pair.
#[derive(Debug, Default)]
pub(crate) struct SinkPlan {
    sinks: Vec<Vec<Sinks>>,
}

impl SinkPlan {
    /// Buffers receiving a property; empty means discard.
    #[inline]
    pub fn sinks(&self, element: usize, property: usize) -> &[usize] {
        &self.sinks[element][property]
    }

    /// Returns true if no property of the element is claimed.
    pub fn element_unclaimed(&self, element: usize) -> bool {
        self.sinks[element].iter().all(|s| s.is_empty())
    }
}

/// Decoded buffers returned by a body read.
#[derive(Debug, Default)]
pub struct PlyBuffers {
    slots: Vec<Option<PlyData>>,
}

impl PlyBuffers {
    pub(crate) fn new(buffers: Vec<PlyData>) -> Self {
        Self {
            slots: buffers.into_iter().map(Some).collect(),
        }
    }

    /// Borrow the buffer of a request.
    pub fn get(&self, id: RequestId) -> Option<&PlyData> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    /// Take ownership of the buffer of a request.
    pub fn take(&mut self, id: RequestId) -> Option<PlyData> {
        self.slots.get_mut(id.0).and_then(Option::take)
    }

    /// Number of requests served.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no requests were registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Remaining buffers in request order.
    pub fn into_vec(self) -> Vec<PlyData> {
        self.slots.into_iter().flatten().collect()
    }
}
