use std::time::Duration;

use crate::sync::{FenceSignal, FrameFence, SyncError};

struct RingSlot<S> {
    resources: S,
    fence: FrameFence,
}

/// N-buffered per-frame resources.
///
/// The CPU writes into slot `current` while the GPU may still read the other
/// slots. Before a slot is reused its fence is waited on, so at most `N`
/// frames are ever in flight.
pub struct FrameRing<S> {
    slots: Vec<RingSlot<S>>,
    current: usize,
    frame_number: u64,
    fence_timeout: Option<Duration>,
}

impl<S> FrameRing<S> {
    pub fn new(resources: Vec<S>, fence_timeout: Option<Duration>) -> Result<Self, SyncError> {
        if resources.is_empty() {
            return Err(SyncError::EmptyRing);
        }
        Ok(Self {
            slots: resources
                .into_iter()
                .map(|resources| RingSlot {
                    resources,
                    fence: FrameFence::new(),
                })
                .collect(),
            current: 0,
            frame_number: 0,
            fence_timeout,
        })
    }

    /// Builds `count` slots with `create(index)`, stopping at the first error.
    pub fn from_fn<E>(
        count: usize,
        fence_timeout: Option<Duration>,
        mut create: impl FnMut(usize) -> Result<S, E>,
    ) -> Result<Self, E>
    where
        E: From<SyncError>,
    {
        let resources = (0..count).map(&mut create).collect::<Result<Vec<_>, E>>()?;
        Ok(Self::new(resources, fence_timeout)?)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Frames finished so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Waits for the GPU to release the current slot and hands it out.
    ///
    /// The ring only advances when the returned frame is
    /// [finished](ActiveFrame::finish); dropping it leaves the slot current.
    pub fn begin_frame<P>(&mut self, pump: P) -> Result<ActiveFrame<'_, S>, SyncError>
    where
        P: FnMut() -> Result<(), SyncError>,
    {
        self.slots[self.current]
            .fence
            .wait(pump, self.fence_timeout)?;
        Ok(ActiveFrame { ring: self })
    }

    /// Waits for every slot. Used before teardown and before rebuilding slots.
    pub fn wait_all<P>(&self, mut pump: P) -> Result<(), SyncError>
    where
        P: FnMut() -> Result<(), SyncError>,
    {
        for slot in &self.slots {
            slot.fence.wait(&mut pump, self.fence_timeout)?;
        }
        Ok(())
    }

    /// Direct access for updates that apply to every slot (e.g. after a resize).
    /// Callers must have waited on the ring first.
    pub fn resources_mut(&mut self) -> impl Iterator<Item = &mut S> {
        self.slots.iter_mut().map(|slot| &mut slot.resources)
    }
}

/// The slot being recorded this frame.
pub struct ActiveFrame<'a, S> {
    ring: &'a mut FrameRing<S>,
}

impl<S> ActiveFrame<'_, S> {
    pub fn slot_index(&self) -> usize {
        self.ring.current
    }

    pub fn frame_number(&self) -> u64 {
        self.ring.frame_number
    }

    pub fn resources(&self) -> &S {
        &self.ring.slots[self.ring.current].resources
    }

    pub fn resources_mut(&mut self) -> &mut S {
        &mut self.ring.slots[self.ring.current].resources
    }

    /// Arms the slot's fence and advances the ring. The returned signal must be
    /// fired once the GPU has consumed the slot.
    pub fn finish(self) -> FenceSignal {
        let ring = self.ring;
        let signal = ring.slots[ring.current].fence.arm();
        ring.current = (ring.current + 1) % ring.slots.len();
        ring.frame_number += 1;
        signal
    }
}
