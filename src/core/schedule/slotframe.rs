// src/core/schedule/slotframe.rs

//! Slotframe records (spec §3): a client-assigned handle and a size in
//! slots, owning an insertion-ordered set of links.

use crate::core::arena::Handle;
use crate::core::schedule::link::Link;

#[derive(Debug, Clone)]
pub struct Slotframe {
    pub handle: u32,
    pub size: u32,
    pub links: Vec<Handle<Link>>,
}

impl Slotframe {
    pub fn new(handle: u32, size: u32) -> Self {
        Self {
            handle,
            size,
            links: Vec::new(),
        }
    }
}
