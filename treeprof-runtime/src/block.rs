//! The timer tree.
//!
//! Blocks live in an arena owned by `TimerTree`; a block refers to its
//! children and its parent by `BlockId`. Children are keyed by name in a
//! `BTreeMap` so that every rank walks them in the same order, which the
//! collective report depends on. Dropping the tree drops every block.

use std::collections::BTreeMap;

use crate::error::ProfError;

/// Index of a block inside its `TimerTree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(usize);

/// One named region of the call tree.
#[derive(Debug)]
pub struct TimerBlock {
    name: String,
    count: u64,
    time_acc: f64,
    /// Start timestamp of the open interval, `None` when stopped.
    t0: Option<f64>,
    parent: Option<BlockId>,
    children: BTreeMap<String, BlockId>,
}

impl TimerBlock {
    fn new(name: String, parent: Option<BlockId>) -> Self {
        Self {
            name,
            count: 0,
            time_acc: 0.0,
            t0: None,
            parent,
            children: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Completed and open `start` calls on this rank.
    pub fn call_count(&self) -> u64 {
        self.count
    }

    /// Raw accumulated time of completed intervals on this rank, without the
    /// ghost fallback of `TimerTree::accumulated_time`.
    pub fn raw_time(&self) -> f64 {
        self.time_acc
    }

    pub fn is_running(&self) -> bool {
        self.t0.is_some()
    }

    pub fn parent(&self) -> Option<BlockId> {
        self.parent
    }

    /// Children in name order.
    pub fn children(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.children.values().copied()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn start(&mut self, now: f64) -> Result<(), ProfError> {
        self.resume(now)?;
        self.count += 1;
        Ok(())
    }

    /// Like `start`, without counting a new call. Used to reopen a block that
    /// was stopped only to take a report.
    pub fn resume(&mut self, now: f64) -> Result<(), ProfError> {
        if self.t0.is_some() {
            return Err(ProfError::AlreadyStarted {
                name: self.name.clone(),
            });
        }
        self.t0 = Some(now);
        Ok(())
    }

    pub fn stop(&mut self, time: f64) -> Result<(), ProfError> {
        let t0 = self.t0.take().ok_or_else(|| ProfError::NotStarted {
            name: self.name.clone(),
        })?;
        self.time_acc += time - t0;
        Ok(())
    }
}

/// Arena of `TimerBlock`s rooted at a block named `root`.
#[derive(Debug)]
pub struct TimerTree {
    blocks: Vec<TimerBlock>,
}

impl TimerTree {
    pub const ROOT: BlockId = BlockId(0);

    pub fn new() -> Self {
        Self {
            blocks: vec![TimerBlock::new("root".to_owned(), None)],
        }
    }

    pub fn get(&self, id: BlockId) -> &TimerBlock {
        &self.blocks[id.0]
    }

    pub fn get_mut(&mut self, id: BlockId) -> &mut TimerBlock {
        &mut self.blocks[id.0]
    }

    /// The child of `parent` called `name`, created on first use.
    pub fn add_child(&mut self, parent: BlockId, name: &str) -> BlockId {
        if let Some(&id) = self.blocks[parent.0].children.get(name) {
            return id;
        }
        let id = BlockId(self.blocks.len());
        self.blocks.push(TimerBlock::new(name.to_owned(), Some(parent)));
        self.blocks[parent.0].children.insert(name.to_owned(), id);
        id
    }

    pub fn child(&self, parent: BlockId, name: &str) -> Option<BlockId> {
        self.blocks[parent.0].children.get(name).copied()
    }

    /// Accumulated time of `id`. A ghost block (never started on this rank)
    /// reports the sum over its children instead.
    pub fn accumulated_time(&self, id: BlockId) -> f64 {
        let block = self.get(id);
        if block.count > 0 {
            block.time_acc
        } else {
            block.children().map(|c| self.accumulated_time(c)).sum()
        }
    }

    /// Accumulated time of the child of `parent` called `name`.
    pub fn children_time(&self, parent: BlockId, name: &str) -> Result<f64, ProfError> {
        let id = self.child(parent, name).ok_or_else(|| ProfError::UnknownChild {
            name: name.to_owned(),
            parent: self.get(parent).name.clone(),
        })?;
        Ok(self.accumulated_time(id))
    }

    /// `id` and its ancestors, excluding the root, innermost first.
    pub fn open_chain(&self, id: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        std::iter::successors(Some(id), |&b| self.get(b).parent).filter(|&b| b != Self::ROOT)
    }

    /// Names along `open_chain`, joined for diagnostics.
    pub fn chain_names(&self, id: BlockId) -> String {
        self.open_chain(id)
            .map(|b| self.get(b).name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for TimerTree {
    fn default() -> Self {
        Self::new()
    }
}
