//! Shared catalog types for folio.
//!
//! This crate holds everything the rest of the workspace agrees on: the
//! [`Image`] entity produced by enumeration, the natural-order comparator
//! used for all user-visible sorting, and the [`FolderTree`] arena built
//! from a flat image list. Pure data and algorithms; no I/O.

mod image;
pub mod natural;
mod tree;

pub use crate::image::{Image, ImageFormat, ImageId, SourceId, assign_indexes, folder_of};
pub use crate::tree::{FolderNode, FolderTree, NodeId};
