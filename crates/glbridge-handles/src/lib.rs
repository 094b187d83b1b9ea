#![forbid(unsafe_code)]

//! Integer handle registries for host-owned objects.
//!
//! A guest module cannot hold a reference to a host graphics object; it only has integers. Each
//! resource category gets one [`HandleTable`] that maps a small `u32` to the host object it stands
//! for. Released slots become tombstones: resolving them fails until the table hands the slot out
//! again as a fresh allocation (lowest free slot first). Every slot carries a generation counter so
//! deferred work can tell "the object I was created for" apart from "whatever lives in that slot
//! now".

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type Handle = u32;

/// Resource categories the bridge keeps tables for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Shader,
    Program,
    UniformLocation,
    Buffer,
    Texture,
    VertexArray,
    Framebuffer,
    Renderbuffer,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Shader,
        Category::Program,
        Category::UniformLocation,
        Category::Buffer,
        Category::Texture,
        Category::VertexArray,
        Category::Framebuffer,
        Category::Renderbuffer,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Category::Shader => "shader",
            Category::Program => "program",
            Category::UniformLocation => "uniform location",
            Category::Buffer => "buffer",
            Category::Texture => "texture",
            Category::VertexArray => "vertex array",
            Category::Framebuffer => "framebuffer",
            Category::Renderbuffer => "renderbuffer",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What handle `0` means for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroHandle {
    /// Slot 0 holds a permanent null object: resolving it yields "no object" and it is never
    /// handed out by [`HandleTable::allocate`].
    #[default]
    Sentinel,
    /// Slot 0 is the first real object.
    Object,
}

/// Identifies one lifetime of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Generation(u32);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("invalid {category} handle {handle}: never allocated")]
    OutOfRange { category: Category, handle: Handle },
    #[error("invalid {category} handle {handle}: already released")]
    Released { category: Category, handle: Handle },
    #[error("{category} handle space exhausted")]
    Exhausted { category: Category },
}

#[derive(Debug)]
enum Slot<T> {
    Null,
    Live { object: T, generation: u32 },
    Released { generation: u32 },
}

#[derive(Debug)]
pub struct HandleTable<T> {
    category: Category,
    zero: ZeroHandle,
    slots: Vec<Slot<T>>,
    free: BTreeSet<Handle>,
    live: usize,
}

impl<T> HandleTable<T> {
    pub fn new(category: Category, zero: ZeroHandle) -> Self {
        let slots = match zero {
            ZeroHandle::Sentinel => vec![Slot::Null],
            ZeroHandle::Object => Vec::new(),
        };
        Self {
            category,
            zero,
            slots,
            free: BTreeSet::new(),
            live: 0,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn zero_handle(&self) -> ZeroHandle {
        self.zero
    }

    /// Number of live objects (the sentinel is not counted).
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Number of slots ever created, including the sentinel and tombstones.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Register `object` and return its handle.
    ///
    /// The lowest tombstoned slot is reused first; otherwise the table grows by one slot.
    pub fn allocate(&mut self, object: T) -> Result<Handle, HandleError> {
        self.allocate_tracked(object).map(|(handle, _)| handle)
    }

    /// Like [`Self::allocate`], also returning the generation of the new slot lifetime.
    pub fn allocate_tracked(&mut self, object: T) -> Result<(Handle, Generation), HandleError> {
        if let Some(handle) = self.free.pop_first() {
            let slot = &mut self.slots[handle as usize];
            let generation = match slot {
                Slot::Released { generation } => generation.wrapping_add(1),
                _ => 0,
            };
            *slot = Slot::Live { object, generation };
            self.live += 1;
            return Ok((handle, Generation(generation)));
        }

        let handle = Handle::try_from(self.slots.len())
            .ok()
            .filter(|&h| h != Handle::MAX)
            .ok_or(HandleError::Exhausted {
                category: self.category,
            })?;
        self.slots.push(Slot::Live {
            object,
            generation: 0,
        });
        self.live += 1;
        Ok((handle, Generation(0)))
    }

    /// Look up `handle`. `Ok(None)` means the null sentinel.
    pub fn resolve(&self, handle: Handle) -> Result<Option<&T>, HandleError> {
        match self.slots.get(handle as usize) {
            None => Err(HandleError::OutOfRange {
                category: self.category,
                handle,
            }),
            Some(Slot::Null) => Ok(None),
            Some(Slot::Released { .. }) => Err(HandleError::Released {
                category: self.category,
                handle,
            }),
            Some(Slot::Live { object, .. }) => Ok(Some(object)),
        }
    }

    /// Generation of a live slot, `None` for the sentinel, tombstones and unknown handles.
    pub fn generation(&self, handle: Handle) -> Option<Generation> {
        match self.slots.get(handle as usize) {
            Some(Slot::Live { generation, .. }) => Some(Generation(*generation)),
            _ => None,
        }
    }

    /// Returns `true` if `handle` still refers to the object that had `generation`.
    pub fn is_live(&self, handle: Handle, generation: Generation) -> bool {
        self.generation(handle) == Some(generation)
    }

    /// Tombstone `handle` and hand its object back to the caller for destruction.
    ///
    /// The object can only be returned once, so the host destroy runs exactly once per
    /// allocation. Releasing the sentinel is a no-op that returns `Ok(None)`.
    pub fn release(&mut self, handle: Handle) -> Result<Option<T>, HandleError> {
        let category = self.category;
        let slot = self
            .slots
            .get_mut(handle as usize)
            .ok_or(HandleError::OutOfRange { category, handle })?;
        let generation = match slot {
            Slot::Null => return Ok(None),
            Slot::Released { .. } => return Err(HandleError::Released { category, handle }),
            Slot::Live { generation, .. } => *generation,
        };
        match std::mem::replace(slot, Slot::Released { generation }) {
            Slot::Live { object, .. } => {
                self.free.insert(handle);
                self.live -= 1;
                Ok(Some(object))
            }
            _ => Ok(None),
        }
    }

    /// Live `(handle, object)` pairs in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot {
            Slot::Live { object, .. } => Some((i as Handle, object)),
            _ => None,
        })
    }

    /// Remove every live object, leaving the table as freshly constructed.
    pub fn drain(&mut self) -> Vec<T> {
        let slots = std::mem::take(&mut self.slots);
        *self = Self::new(self.category, self.zero);
        slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Live { object, .. } => Some(object),
                _ => None,
            })
            .collect()
    }
}
