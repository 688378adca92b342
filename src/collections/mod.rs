//! Container types backing the task queue, plus an arena tree.

pub mod slot_list;
pub mod tree;

pub use slot_list::{Entries, Iter, SlotId, SlotList, SlotListError};
pub use tree::{Ancestors, Children, Descendants, NodeId, Tree, TreeError};
