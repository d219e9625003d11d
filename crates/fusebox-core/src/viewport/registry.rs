use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FuseboxError, Result};
use crate::series::SeriesId;

use super::config::{ViewportConfig, ViewportId};
use super::layout::LayoutPreset;

/// Ordinal (1-based slot position) → assigned secondary, derived from the
/// slot list after every mutation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportAssignments(BTreeMap<usize, Option<SeriesId>>);

impl ViewportAssignments {
    pub fn get(&self, ordinal: usize) -> Option<Option<SeriesId>> {
        self.0.get(&ordinal).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Option<SeriesId>)> + '_ {
        self.0.iter().map(|(&ordinal, &secondary)| (ordinal, secondary))
    }
}

/// Ordered list of viewport slots. Slot 1 is the primary pane and can never
/// be removed; every non-null secondary is assigned to at most one slot.
#[derive(Clone, Debug)]
pub struct ViewportRegistry {
    slots: Vec<ViewportConfig>,
    next_id: u32,
    max_slots: usize,
}

impl ViewportRegistry {
    pub fn new(max_slots: usize) -> Self {
        Self {
            slots: vec![ViewportConfig::new(ViewportId::PRIMARY, None)],
            next_id: 1,
            max_slots: max_slots.max(1),
        }
    }

    pub fn slots(&self) -> &[ViewportConfig] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.max_slots
    }

    pub fn get(&self, id: ViewportId) -> Option<&ViewportConfig> {
        self.slots.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: ViewportId) -> Option<&mut ViewportConfig> {
        self.slots.iter_mut().find(|s| s.id == id)
    }

    /// Fetch a slot or fail with `UnknownViewport`.
    pub fn require_mut(&mut self, id: ViewportId) -> Result<&mut ViewportConfig> {
        self.get_mut(id).ok_or(FuseboxError::UnknownViewport(id))
    }

    /// 1-based position of a slot.
    pub fn ordinal_of(&self, id: ViewportId) -> Option<usize> {
        self.slots.iter().position(|s| s.id == id).map(|i| i + 1)
    }

    pub fn assignments(&self) -> ViewportAssignments {
        ViewportAssignments(
            self.slots
                .iter()
                .enumerate()
                .map(|(i, s)| (i + 1, s.secondary_series_id))
                .collect(),
        )
    }

    /// Distinct secondaries currently shown by any slot, in slot order.
    pub fn referenced_secondaries(&self) -> Vec<SeriesId> {
        self.slots
            .iter()
            .filter_map(|s| s.secondary_series_id)
            .collect()
    }

    /// Whether `secondary` is shown by a slot other than `except`.
    pub fn is_assigned(&self, secondary: SeriesId, except: Option<ViewportId>) -> bool {
        self.slots
            .iter()
            .any(|s| Some(s.id) != except && s.secondary_series_id == Some(secondary))
    }

    /// First candidate nobody shows yet, then the default if it is free,
    /// then nothing.
    fn first_available(
        &self,
        candidates: &[SeriesId],
        default: Option<SeriesId>,
    ) -> Option<SeriesId> {
        candidates
            .iter()
            .copied()
            .find(|&c| !self.is_assigned(c, None))
            .or_else(|| default.filter(|&d| !self.is_assigned(d, None)))
    }

    fn push_slot(&mut self, secondary: Option<SeriesId>) -> ViewportId {
        let id = ViewportId(self.next_id);
        self.next_id += 1;
        self.slots.push(ViewportConfig::new(id, secondary));
        id
    }

    /// Grow or shrink to the preset's slot count. Surviving slots keep their
    /// position and content. Returns the ids of removed slots.
    pub fn apply_preset(
        &mut self,
        preset: LayoutPreset,
        candidates: &[SeriesId],
        default: Option<SeriesId>,
    ) -> Vec<ViewportId> {
        let target = preset.slot_count().clamp(1, self.max_slots);

        let removed: Vec<ViewportId> = if self.slots.len() > target {
            self.slots.drain(target..).map(|s| s.id).collect()
        } else {
            Vec::new()
        };

        while self.slots.len() < target {
            let secondary = self.first_available(candidates, default);
            let id = self.push_slot(secondary);
            debug!(viewport = %id, secondary = ?secondary, "Slot created by layout change");
        }

        removed
    }

    /// Append a slot with the first available secondary.
    pub fn add_viewport(
        &mut self,
        candidates: &[SeriesId],
        default: Option<SeriesId>,
    ) -> Option<ViewportId> {
        if self.is_full() {
            debug!(max = self.max_slots, "Add viewport ignored: at capacity");
            return None;
        }
        let secondary = self.first_available(candidates, default);
        Some(self.push_slot(secondary))
    }

    /// Append a slot showing `secondary`. Ignored at capacity or when the
    /// secondary is already on screen.
    pub fn add_viewport_with_secondary(&mut self, secondary: SeriesId) -> Option<ViewportId> {
        if self.is_full() {
            debug!(max = self.max_slots, "Add viewport ignored: at capacity");
            return None;
        }
        if self.is_assigned(secondary, None) {
            let conflict = FuseboxError::AssignmentConflict { secondary };
            debug!(error = %conflict, "Add viewport ignored");
            return None;
        }
        Some(self.push_slot(Some(secondary)))
    }

    /// Remove a non-primary slot. Returns whether a slot was removed.
    pub fn remove_viewport(&mut self, id: ViewportId) -> bool {
        if id.is_primary() {
            debug!("Refusing to remove the primary viewport");
            return false;
        }
        let before = self.slots.len();
        self.slots.retain(|s| s.id != id);
        self.slots.len() != before
    }

    /// Exchange the content of slots 1 and 2. Ids stay in place, so the
    /// primary role never moves.
    pub fn swap(&mut self) -> bool {
        match self.slots.as_mut_slice() {
            [first, second, ..] => {
                first.swap_content(second);
                true
            }
            _ => false,
        }
    }

    /// Point a slot at another secondary (or none). Returns `Ok(false)` when
    /// the secondary is already shown by another slot.
    pub fn change_secondary(
        &mut self,
        id: ViewportId,
        secondary: Option<SeriesId>,
    ) -> Result<bool> {
        if let Some(s) = secondary {
            if self.is_assigned(s, Some(id)) {
                let conflict = FuseboxError::AssignmentConflict { secondary: s };
                debug!(viewport = %id, error = %conflict, "Reassignment ignored");
                return Ok(false);
            }
        }
        let slot = self.require_mut(id)?;
        if slot.secondary_series_id == secondary {
            return Ok(false);
        }
        slot.reassign(secondary);
        Ok(true)
    }
}
