use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use bytemuck::{Pod, Zeroable};

/// Per-cluster slice of the shared light index list.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct LightGridEntry {
    pub offset: u32,
    pub count: u32,
}

/// Flat, fixed-capacity array of light indices shared by every cluster.
///
/// Writers reserve disjoint regions through a single atomic counter, so
/// clusters can be processed in any order and on any thread. A reservation
/// that does not fit is cut down to the space left; the list never writes past
/// its capacity.
#[derive(Debug)]
pub struct LightIndexList {
    indices: Vec<AtomicU32>,
    next: AtomicU32,
    overflowed: AtomicBool,
}

impl LightIndexList {
    pub fn new(capacity: u32) -> Self {
        Self {
            indices: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            next: AtomicU32::new(0),
            overflowed: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Rewinds the counter. Must run before any cluster of a frame reserves.
    pub fn reset(&mut self) {
        *self.next.get_mut() = 0;
        *self.overflowed.get_mut() = false;
    }

    /// Reserves `count` slots. Returns the region's offset and how many of the
    /// requested slots actually fit.
    pub fn reserve(&self, count: u32) -> (u32, u32) {
        let offset = match self
            .next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_add(count))
            }) {
            Ok(previous) | Err(previous) => previous,
        };
        let stored = count.min(self.capacity().saturating_sub(offset));
        if stored < count {
            self.overflowed.store(true, Ordering::Relaxed);
        }
        (offset.min(self.capacity()), stored)
    }

    /// Fills a region previously handed out by [`LightIndexList::reserve`].
    /// Entries past the end of the list are ignored.
    pub fn write(&self, offset: u32, lights: &[u32]) {
        let start = (offset as usize).min(self.indices.len());
        for (slot, &light) in self.indices[start..].iter().zip(lights) {
            slot.store(light, Ordering::Relaxed);
        }
    }

    pub fn get(&self, index: u32) -> Option<u32> {
        self.indices
            .get(index as usize)
            .map(|slot| slot.load(Ordering::Relaxed))
    }

    /// Slots handed out this frame, capped at capacity.
    pub fn used(&self) -> u32 {
        self.next.load(Ordering::Relaxed).min(self.capacity())
    }

    /// Slots asked for this frame, including those that did not fit.
    pub fn requested(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed.load(Ordering::Relaxed)
    }

    /// Copies the used prefix into `out` for upload.
    pub fn copy_used_into(&self, out: &mut Vec<u32>) {
        out.clear();
        out.extend(
            self.indices[..self.used() as usize]
                .iter()
                .map(|slot| slot.load(Ordering::Relaxed)),
        );
    }
}

/// CPU-side output of light assignment: one grid entry per cluster plus the
/// index list the entries point into.
#[derive(Debug)]
pub struct ClusterLightLists {
    grid: Vec<LightGridEntry>,
    indices: LightIndexList,
}

impl ClusterLightLists {
    pub fn new(cluster_count: u32, index_capacity: u32) -> Self {
        Self {
            grid: vec![LightGridEntry::default(); cluster_count as usize],
            indices: LightIndexList::new(index_capacity),
        }
    }

    pub fn cluster_count(&self) -> u32 {
        self.grid.len() as u32
    }

    /// Resizes the grid after the cluster count changed. Entries are zeroed.
    pub fn resize(&mut self, cluster_count: u32) {
        self.grid.clear();
        self.grid
            .resize(cluster_count as usize, LightGridEntry::default());
    }

    pub fn reset(&mut self) {
        self.grid.fill(LightGridEntry::default());
        self.indices.reset();
    }

    pub fn grid(&self) -> &[LightGridEntry] {
        &self.grid
    }

    pub fn indices(&self) -> &LightIndexList {
        &self.indices
    }

    /// Grid entries are written per cluster while the index list is shared.
    pub fn split_mut(&mut self) -> (&mut [LightGridEntry], &LightIndexList) {
        (&mut self.grid, &self.indices)
    }

    /// Light indices assigned to `cluster`, in list order.
    pub fn cluster_lights(&self, cluster: u32) -> Vec<u32> {
        let entry = self.grid[cluster as usize];
        (entry.offset..entry.offset + entry.count)
            .filter_map(|i| self.indices.get(i))
            .collect()
    }

    /// Same as [`ClusterLightLists::cluster_lights`], sorted for set comparison.
    pub fn light_set(&self, cluster: u32) -> Vec<u32> {
        let mut lights = self.cluster_lights(cluster);
        lights.sort_unstable();
        lights
    }
}
