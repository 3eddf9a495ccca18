// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed register storage grouped into named address blocks.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use parking_lot::{RwLock, RwLockReadGuard};
use serde::Serialize;

use crate::frame::{Address, Coil, Word};

/// The kind of data items stored by a [`RegisterMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RegisterKind {
    Coils,
    HoldingRegisters,
    InputRegisters,
}

impl RegisterKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Coils => "Coils",
            Self::HoldingRegisters => "HoldingRegisters",
            Self::InputRegisters => "InputRegisters",
        }
    }
}

impl Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The string did not name a [`RegisterKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRegisterKind;

impl FromStr for RegisterKind {
    type Err = UnknownRegisterKind;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Coils,
            Self::HoldingRegisters,
            Self::InputRegisters,
        ]
        .into_iter()
        .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
        .ok_or(UnknownRegisterKind)
    }
}

/// A contiguous, named address range `[start, start + size)` with its own
/// storage.
///
/// Every access holds the block lock for the whole operation. Multi-item
/// writes are therefore observed entirely or not at all.
#[derive(Debug)]
pub struct RegisterBlock<T> {
    name: String,
    start: Address,
    size: usize,
    time_sync: bool,
    data: RwLock<Vec<T>>,
}

impl<T> RegisterBlock<T>
where
    T: Copy + Default,
{
    /// Create a block with `size` zeroed items.
    #[must_use]
    pub fn new(name: impl Into<String>, start: Address, size: usize) -> Self {
        Self {
            name: name.into(),
            start,
            size,
            time_sync: false,
            data: RwLock::new(vec![T::default(); size]),
        }
    }

    /// Mark the block as the time sync block of its slave.
    #[must_use]
    pub fn with_time_sync(mut self, time_sync: bool) -> Self {
        self.time_sync = time_sync;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn start(&self) -> Address {
        self.start
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub const fn is_time_sync(&self) -> bool {
        self.time_sync
    }

    #[must_use]
    pub fn contains(&self, address: Address) -> bool {
        self.offset(address).is_some()
    }

    /// Whether `[start, start + quantity)` lies entirely inside this block.
    #[must_use]
    pub fn contains_range(&self, start: Address, quantity: usize) -> bool {
        self.offset(start)
            .and_then(|offset| offset.checked_add(quantity))
            .is_some_and(|end| end <= self.size)
    }

    fn offset(&self, address: Address) -> Option<usize> {
        let offset = usize::from(address.checked_sub(self.start)?);
        (offset < self.size).then_some(offset)
    }

    /// Read `quantity` items starting at `start`.
    ///
    /// Returns `None` unless the whole range lies inside this block.
    #[must_use]
    pub fn read(&self, start: Address, quantity: usize) -> Option<Vec<T>> {
        if !self.contains_range(start, quantity) {
            return None;
        }
        let offset = usize::from(start - self.start);
        Some(self.data.read()[offset..offset + quantity].to_vec())
    }

    /// Write `values` starting at `start`.
    ///
    /// Nothing is written and `false` is returned unless the whole range
    /// lies inside this block.
    #[must_use]
    pub fn write(&self, start: Address, values: &[T]) -> bool {
        if !self.contains_range(start, values.len()) {
            return false;
        }
        let offset = usize::from(start - self.start);
        self.data.write()[offset..offset + values.len()].copy_from_slice(values);
        true
    }

    #[must_use]
    pub fn write_single(&self, address: Address, value: T) -> bool {
        let Some(offset) = self.offset(address) else {
            return false;
        };
        self.data.write()[offset] = value;
        true
    }

    fn lock_read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.data.read()
    }
}

pub type CoilBlock = RegisterBlock<Coil>;
pub type WordBlock = RegisterBlock<Word>;

/// The blocks of one [`RegisterKind`] owned by a slave.
///
/// Blocks are consulted in declaration order and the first block
/// containing an address wins, even if a later block overlaps it.
#[derive(Debug)]
pub struct RegisterMap<T> {
    kind: RegisterKind,
    blocks: Vec<RegisterBlock<T>>,
}

impl<T> RegisterMap<T>
where
    T: Copy + Default,
{
    #[must_use]
    pub fn new(kind: RegisterKind, blocks: Vec<RegisterBlock<T>>) -> Self {
        Self { kind, blocks }
    }

    #[must_use]
    pub const fn kind(&self) -> RegisterKind {
        self.kind
    }

    #[must_use]
    pub fn blocks(&self) -> &[RegisterBlock<T>] {
        &self.blocks
    }

    /// The first block containing `address`.
    #[must_use]
    pub fn find_block(&self, address: Address) -> Option<&RegisterBlock<T>> {
        self.blocks.iter().find(|block| block.contains(address))
    }

    /// The first block containing all of `[start, start + quantity)`.
    #[must_use]
    pub fn find_block_for_range(
        &self,
        start: Address,
        quantity: usize,
    ) -> Option<&RegisterBlock<T>> {
        self.blocks
            .iter()
            .find(|block| block.contains_range(start, quantity))
    }

    fn find_block_index(&self, address: Address) -> Option<usize> {
        self.blocks.iter().position(|block| block.contains(address))
    }

    /// Read `quantity` items starting at `start`, resolving every address
    /// to the first block containing it.
    ///
    /// The range may span several blocks. All of them are locked for
    /// reading, in declaration order, before the first item is copied.
    /// Returns `None` if any address is not covered by a block.
    #[must_use]
    pub fn read(&self, start: Address, quantity: usize) -> Option<Vec<T>> {
        let end = usize::from(start).checked_add(quantity)?;
        if end > usize::from(Address::MAX) + 1 {
            return None;
        }
        let mut resolved = Vec::with_capacity(quantity);
        let mut locked = vec![false; self.blocks.len()];
        for i in 0..quantity {
            let address = Address::try_from(usize::from(start) + i).ok()?;
            let index = self.find_block_index(address)?;
            locked[index] = true;
            resolved.push((address, index));
        }
        let guards: Vec<Option<RwLockReadGuard<'_, Vec<T>>>> = self
            .blocks
            .iter()
            .zip(locked)
            .map(|(block, locked)| locked.then(|| block.lock_read()))
            .collect();
        resolved
            .into_iter()
            .map(|(address, index)| {
                let data = guards[index].as_ref()?;
                Some(data[usize::from(address - self.blocks[index].start)])
            })
            .collect()
    }
}
